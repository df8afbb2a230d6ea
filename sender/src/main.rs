use std::error::Error;
use std::time::Instant;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};

use relmq::{MessageQueue, QueueConfig};

#[derive(Parser)]
#[command(about = "Send messages into a relmq queue")]
struct Opts {
    #[arg(short = 'c', long = "config", default_value = "relmq-sender.toml")]
    config: String,
    /// Number of messages to send.
    #[arg(long, default_value_t = 10_000)]
    count: usize,
    /// Message body; the sequence number is appended.
    #[arg(long, default_value = "message")]
    message: String,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct SenderConfig {
    queue: QueueConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts = Opts::parse();
    let cfg: SenderConfig = confy::load_path(&opts.config)?;
    let queue = MessageQueue::from_config(&cfg.queue)?;
    run(&queue, &opts)
}

fn run(queue: &MessageQueue, opts: &Opts) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    for i in 0..opts.count {
        let body = format!("{} {}", opts.message, i);
        queue.send(body.as_bytes())?;
        if i > 0 && i % 100_000 == 0 {
            eprint!("\r{i} sent");
        }
    }
    let elapsed = start.elapsed();
    let rate = opts.count as f64 / elapsed.as_secs_f64();
    println!(
        "\nsent {} messages to \"{}\" in {:?} ({:.0} msg/s)",
        opts.count,
        queue.name(),
        elapsed,
        rate
    );
    Ok(())
}
