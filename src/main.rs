use std::path::PathBuf;

use alloy_primitives::Address;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lottery_console::config::Config;
use lottery_console::console::Console;
use lottery_console::lottery::{parse_draw_time, CreateLotteryParams, LotterySnapshot};

/// Lottery operator console - agent wallets, funding and batch entries
#[derive(Parser, Debug)]
#[command(name = "lottery-console", version, about)]
struct Cli {
    /// Config file (TOML); LOTTERY_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage agent wallets
    #[command(subcommand)]
    Agents(AgentsCommand),

    /// Inspect and administer lotteries
    #[command(subcommand)]
    Lottery(LotteryCommand),
}

#[derive(Subcommand, Debug)]
enum AgentsCommand {
    /// Show stored agents and their last known balances
    List,
    /// Generate new agents and fund them from the admin wallet
    Create {
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
    /// Re-read every agent's balances
    Refresh,
    /// Append agents from a CSV file
    Import { file: PathBuf },
    /// Write agents (with private keys) as CSV
    Export {
        /// Output file, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every stored agent
    Clear {
        /// Confirm deletion of all agent keys
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LotteryCommand {
    /// Active and drawn lotteries, newest first
    List,
    /// Details of one lottery
    Show { id: u64 },
    /// Create a lottery (admin)
    Create(CreateArgs),
    /// Draw the winner (admin)
    Draw { id: u64 },
    /// Cancel a lottery (admin)
    Cancel { id: u64 },
    /// Enter agents into a lottery
    Join {
        id: u64,
        /// Agent address; repeat for several
        #[arg(short, long = "agent")]
        agents: Vec<String>,
        /// Every stored agent
        #[arg(long, conflicts_with = "agents")]
        all: bool,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// ERC-20 token address, defaults to the configured token
    #[arg(long)]
    token: Option<String>,
    /// Participation fee in whole tokens
    #[arg(long)]
    fee: String,
    #[arg(long)]
    max_participants: u64,
    /// Unix seconds, RFC 3339, or local YYYY-MM-DDTHH:MM
    #[arg(long)]
    draw_time: String,
    #[arg(long, default_value_t = 70)]
    prize: u64,
    #[arg(long, default_value_t = 20)]
    investment: u64,
    #[arg(long, default_value_t = 10)]
    profit: u64,
    /// Submit even if the percentages do not sum to 100
    #[arg(long)]
    force: bool,
}

fn print_lottery(lottery: &LotterySnapshot, now: i64) {
    println!(
        "#{} [{}] token {} fee {} (base units) participants {}/{} split {}/{}/{} draw {}",
        lottery.id,
        lottery.status_label(),
        lottery.token_address,
        lottery.participation_fee,
        lottery.participants.len(),
        lottery.max_participants,
        lottery.prize_percentage,
        lottery.investment_percentage,
        lottery.profit_percentage,
        lottery.time_left(now),
    );
    if lottery.is_drawn {
        println!("    winner {}", lottery.winner);
    }
}

async fn run_agents(
    console: &mut Console,
    command: AgentsCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AgentsCommand::List => {
            for (i, agent) in console.agents().iter().enumerate() {
                println!(
                    "{:>3}  {}  native {}  token {}",
                    i + 1,
                    agent.address,
                    agent.native_balance,
                    agent.token_balance
                );
            }
        }
        AgentsCommand::Create { count } => {
            for result in console.create_and_fund_agents(count).await? {
                println!("{}", serde_json::to_string(&result)?);
            }
        }
        AgentsCommand::Refresh => console.refresh_balances().await,
        AgentsCommand::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            console.import_csv(&text).await;
        }
        AgentsCommand::Export { output } => {
            if let Some(csv) = console.export_csv() {
                match output {
                    Some(path) => std::fs::write(path, csv)?,
                    None => print!("{csv}"),
                }
            }
        }
        AgentsCommand::Clear { yes } => {
            console.clear_agents(yes);
        }
    }
    Ok(())
}

async fn run_lottery(
    console: &mut Console,
    command: LotteryCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now().timestamp();
    match command {
        LotteryCommand::List => {
            if let Some(board) = console.load_lotteries().await {
                println!("Active:");
                board.active.iter().for_each(|l| print_lottery(l, now));
                println!("Drawn:");
                board.drawn.iter().for_each(|l| print_lottery(l, now));
            }
        }
        LotteryCommand::Show { id } => {
            let lottery = console.lottery_info(id).await?;
            print_lottery(&lottery, now);
            for participant in &lottery.participants {
                println!("    {participant}");
            }
        }
        LotteryCommand::Create(args) => {
            let token = match &args.token {
                Some(t) => t.parse::<Address>()?,
                None => console
                    .token()
                    .ok_or("no token address: pass --token or configure contracts.token")?,
            };
            let draw_time = parse_draw_time(&args.draw_time)
                .ok_or_else(|| format!("unrecognised draw time {}", args.draw_time))?;
            let participation_fee = console.token_amount(token, &args.fee).await?;
            let params = CreateLotteryParams {
                token,
                participation_fee,
                max_participants: args.max_participants,
                draw_time,
                prize_percentage: args.prize,
                investment_percentage: args.investment,
                profit_percentage: args.profit,
            };
            let hash = console.create_lottery(&params, args.force).await?;
            println!("{hash}");
        }
        LotteryCommand::Draw { id } => {
            println!("{}", console.draw_winner(id).await?);
        }
        LotteryCommand::Cancel { id } => {
            println!("{}", console.cancel_lottery(id).await?);
        }
        LotteryCommand::Join { id, agents, all } => {
            let lottery = console.lottery_info(id).await?;
            let selection: Vec<String> = if all {
                console.agents().iter().map(|a| a.address.clone()).collect()
            } else {
                agents
            };
            for result in console.join_lottery(&lottery, &selection).await? {
                println!("{}", serde_json::to_string(&result)?);
            }
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let mut console = Console::open(config)?;

    let outcome = match cli.command {
        Command::Agents(command) => run_agents(&mut console, command).await,
        Command::Lottery(command) => run_lottery(&mut console, command).await,
    };

    // apply any background balance refresh before exiting
    console.settle().await;
    eprintln!("{}", console.log().render());
    outcome
}
