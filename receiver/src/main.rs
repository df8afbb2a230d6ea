use std::error::Error;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use relmq::{MessageQueue, QueueConfig, QueueError};

#[derive(Parser)]
#[command(about = "Receive and print messages from a relmq queue")]
struct Opts {
    #[arg(short = 'c', long = "config", default_value = "relmq-receiver.toml")]
    config: String,
    /// Count messages without printing them.
    #[arg(long)]
    quiet: bool,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ReceiverConfig {
    queue: QueueConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts = Opts::parse();
    let cfg: ReceiverConfig = confy::load_path(&opts.config)?;
    let queue = Arc::new(MessageQueue::from_config(&cfg.queue)?);

    // A signal aborts the blocked receive below instead of killing the
    // process mid-message.
    let stopper = Arc::clone(&queue);
    let mut signals = Signals::new([SIGHUP, SIGINT, SIGQUIT, SIGTERM])?;
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            let _ = stopper.stop();
        }
    });

    run(&queue, &opts)
}

fn run(queue: &MessageQueue, opts: &Opts) -> Result<(), Box<dyn Error>> {
    let mut buffer = vec![0u8; queue.max_message_size()];
    let mut count = 0u64;
    loop {
        match queue.receive_into(&mut buffer) {
            Ok(len) => {
                count += 1;
                if !opts.quiet {
                    println!("{}", String::from_utf8_lossy(&buffer[..len]));
                }
            }
            Err(QueueError::Aborted) => break,
            Err(err) => return Err(err.into()),
        }
    }
    eprintln!("received {count} messages from \"{}\"", queue.name());
    Ok(())
}
