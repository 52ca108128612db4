use std::sync::Arc;

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use donation_ledger_sync::campaign::CampaignRegistry;
use donation_ledger_sync::chain::EthRpcClient;
use donation_ledger_sync::ledger::DonationSyncService;
use donation_ledger_sync::ledger::projection::Projection;
use donation_ledger_sync::ledger::subscription::{SubscriptionManager, WsListenerSpawner};
use donation_ledger_sync::workflow::{DonationRequest, WorkflowEngine};
use tracing::{error, info};

#[derive(Parser)]
#[command(about = "Donation ledger synchronizer and transaction workflow engine")]
struct Args {
	/// JSON-RPC HTTP endpoint of the node
	#[arg(long, default_value = "http://localhost:8545")]
	rpc_url: String,

	/// WebSocket endpoint of the node, for live event subscriptions
	#[arg(long, default_value = "ws://localhost:8546")]
	ws_url: String,

	/// Address of the deployed donation manager contract
	#[arg(long, default_value = "0x1ebC2a00a114441d608A8788AE46e5cDDB4b3E6f")]
	donation_manager: String,

	/// Address of the deployed charity wallet contract
	#[arg(long, default_value = "0x1743D7aD376877c2CEa32Ad885A3373cff0f197a")]
	charity_wallet: String,

	/// Account used as `from` on submitted transactions
	#[arg(long)]
	sender: Option<String>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
	/// Build the donation projection and keep it fresh from live events
	Sync,
	/// Submit one donation and wait for its confirmation
	Donate {
		/// ERC-20 token address; omit to donate ETH directly
		#[arg(long)]
		token: Option<String>,

		/// Donation amount in asset-native units
		#[arg(long)]
		amount: String,

		/// Campaign the donation is attributed to
		#[arg(long, default_value = "Clean Water Initiative")]
		campaign: String,
	},
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let args = Args::parse();

	let Some(donation_manager) = parse_address("donation manager", &args.donation_manager) else {
		return;
	};
	let Some(charity_wallet) = parse_address("charity wallet", &args.charity_wallet) else {
		return;
	};

	let mut client = EthRpcClient::new(args.rpc_url.clone(), args.ws_url.clone());
	if let Some(sender) = &args.sender {
		let Some(sender) = parse_address("sender", sender) else {
			return;
		};
		client = client.with_sender(sender);
	}

	match args.command.unwrap_or(Command::Sync) {
		Command::Sync => run_sync(client, donation_manager, charity_wallet).await,
		Command::Donate {
			token,
			amount,
			campaign,
		} => run_donate(client, donation_manager, charity_wallet, token, amount, campaign).await,
	}
}

async fn run_sync(client: EthRpcClient, donation_manager: Address, charity_wallet: Address) {
	info!("Starting donation ledger sync");

	let mut service = DonationSyncService::new(
		Arc::new(client.clone()),
		Arc::new(client.ledger_source(donation_manager)),
		Arc::new(client.native_source(charity_wallet)),
		Arc::new(client.clone()),
		CampaignRegistry::new(),
	);

	if let Err(e) = service.resync().await {
		error!("Initial synchronization failed ({}): {}", service.status(), e);
		return;
	}
	info!("Node connection {}", service.status());
	print_projection(&service.projection());

	let spawner = WsListenerSpawner::new(client.ws_url().to_string());
	let (mut subscriptions, mut notify_rx) = SubscriptionManager::new(spawner);
	subscriptions.resubscribe(&[donation_manager, charity_wallet]);

	info!("Watching for new donations");
	service.run_live(&mut notify_rx).await;
}

async fn run_donate(
	client: EthRpcClient,
	donation_manager: Address,
	charity_wallet: Address,
	token: Option<String>,
	amount: String,
	campaign: String,
) {
	let engine = WorkflowEngine::new(
		Arc::new(client.clone()),
		Arc::new(client.clone()),
		Arc::new(client.donation_manager(donation_manager)),
		CampaignRegistry::new(),
		charity_wallet,
		donation_manager,
	);

	let request = DonationRequest {
		token,
		amount,
		campaign,
	};

	match engine.submit(request).await {
		Ok(receipt) => {
			info!(
				"Donation confirmed in transaction {} (campaign id {})",
				receipt.tx_hash, receipt.campaign_id
			);
		}
		Err(e) => {
			error!("Donation failed: {}", e);
		}
	}
}

fn print_projection(projection: &Projection) {
	info!(
		"Totals up to block {}: {:.4} ETH, {:.4} tokens",
		projection.synced_at_block,
		projection.aggregates.total_eth,
		projection.aggregates.total_token
	);
	for (campaign, total) in &projection.aggregates.per_campaign {
		info!("  {}: {:.4}", campaign, total);
	}
	for record in &projection.recent {
		info!(
			"  {} donated {:.4} {} to {} at {}",
			shorten(record.donor),
			record.human_amount,
			record.asset_label,
			record.campaign_name,
			format_timestamp(record.timestamp)
		);
	}
}

fn parse_address(label: &str, value: &str) -> Option<Address> {
	match value.parse::<Address>() {
		Ok(address) => Some(address),
		Err(e) => {
			error!("Invalid {} address {:?}: {}", label, value, e);
			None
		}
	}
}

fn shorten(address: Address) -> String {
	let full = format!("{address}");
	format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

fn format_timestamp(timestamp: u64) -> String {
	chrono::DateTime::from_timestamp(timestamp as i64, 0)
		.map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
		.unwrap_or_else(|| timestamp.to_string())
}
