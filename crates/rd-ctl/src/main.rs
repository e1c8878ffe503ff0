//! rd-ctl — command-line interface for the resource directory daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::http::parse_filters;

const DEFAULT_PORT: u16 = 9001;

fn print_usage() {
    println!("Usage: rd-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                    Show daemon status");
    println!("  endpoints [name=value..]  List registrations matching the filters");
    println!("  show <id>                 Show one registration and its links");
    println!("  remove <id>               Delete a registration");
    println!("  resources [name=value..]  Resource lookup");
    println!("  domains [name=value..]    Domain lookup");
    println!("  shutdown                  Stop the daemon");
    println!();
    println!("Filters use lookup syntax: a trailing * matches a prefix,");
    println!("page=N and count=N paginate.");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["endpoints", filters @ ..] => {
            cmd::endpoints::cmd_endpoints(port, &parse_filters(filters)).await
        }
        ["show", id] => cmd::endpoints::cmd_show(port, id).await,
        ["remove", id] => cmd::endpoints::cmd_remove(port, id).await,
        ["resources", filters @ ..] => cmd::lookup::cmd_resources(port, &parse_filters(filters)).await,
        ["domains", filters @ ..] => cmd::lookup::cmd_domains(port, &parse_filters(filters)).await,
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
