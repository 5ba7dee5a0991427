use clap::Parser;
use dotenv::dotenv;
use log::info;
use std::error::Error;
use std::io::Write;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };

use optiserve_chat::agent::Delivery;
use optiserve_chat::models::chat::Role;
use optiserve_chat::widget::render::{ render_message, Block };
use optiserve_chat::widget::state::{ ChatMessage, MessageBody, DEFAULT_BOOKING_URL, MAX_INPUT_CHARS };
use optiserve_chat::widget::transport::HttpRelayTransport;
use optiserve_chat::widget::{ ChatWidget, DEFAULT_CTA_DELAY };

/// Terminal front end for the OptiServe chat relay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ConsoleArgs {
    /// Chat endpoint of the relay.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:3001/chat")]
    relay_url: String,

    /// Ask the relay for a streamed reply.
    #[arg(long, env = "RELAY_STREAM", default_value = "false")]
    stream: bool,

    /// Link shown on the "Book Demo" call to action.
    #[arg(long, env = "BOOKING_URL", default_value = DEFAULT_BOOKING_URL)]
    booking_url: String,

    /// Pause before the call to action appears, in milliseconds.
    #[arg(long, env = "CTA_DELAY_MS")]
    cta_delay_ms: Option<u64>,
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Kenneth",
    }
}

/// Returns the length of a line the input box would cut short.
fn overlong(line: &str) -> Option<usize> {
    let chars = line.trim().chars().count();
    (chars > MAX_INPUT_CHARS).then_some(chars)
}

fn print_message(message: &ChatMessage) {
    let rendered = render_message(message);
    for block in rendered.blocks {
        match block {
            Block::Paragraph(text) => println!("{}: {}", speaker(rendered.role), text),
            Block::Link { label, href } => println!("[{}] {}", label, href),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = ConsoleArgs::parse();

    let delivery = if args.stream { Delivery::Streaming } else { Delivery::Buffered };
    let cta_delay = args.cta_delay_ms.map(Duration::from_millis).unwrap_or(DEFAULT_CTA_DELAY);
    info!("Relay: {} ({:?})", args.relay_url, delivery);

    let transport = HttpRelayTransport::new(args.relay_url)?;
    let mut widget = ChatWidget::new(transport, delivery)
        .with_booking_url(args.booking_url)
        .with_cta_delay(cta_delay);
    widget.open();

    for message in widget.state().transcript() {
        print_message(message);
    }
    println!("(type /clear to start over, /quit to leave)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => {
                break;
            }
        };

        match line.trim() {
            "/quit" => {
                break;
            }
            "/clear" => {
                widget.clear_conversation();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        if let Some(chars) = overlong(&line) {
            println!("(message too long: {} characters, the limit is {})", chars, MAX_INPUT_CHARS);
            continue;
        }

        let before = widget.state().transcript().len();
        let mut streamed = String::new();
        widget.set_input(line);
        let sent = widget.submit_input_with(|chunk| {
            if streamed.is_empty() {
                print!("{}: ", speaker(Role::Assistant));
            }
            streamed.push_str(chunk);
            print!("{}", chunk);
            let _ = std::io::stdout().flush();
        }).await;
        if !sent {
            continue;
        }
        if !streamed.is_empty() {
            println!();
        }

        for message in widget.state().transcript().iter().skip(before) {
            let already_shown = matches!(
                &message.body,
                MessageBody::Text(text) if !streamed.is_empty() && *text == streamed
            );
            if message.role == Role::User || already_shown {
                continue;
            }
            print_message(message);
        }
    }

    widget.close();
    Ok(())
}
