// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! cobridge demo runner.

mod help;
mod output;

use std::env;
use std::process;

use cobridge_demo::config::{Command, DemoConfig, Invocation};
use cobridge_demo::Demo;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    output::init();
    init_tracing();

    let invocation = match Invocation::parse(env::args().skip(1), DemoConfig::from_env()) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            eprintln!();
            help::print_usage();
            process::exit(1);
        }
    };

    match invocation.command {
        Command::Help => help::print_usage(),
        Command::Version => println!("cobridge-demo {}", help::VERSION),
        command => run(command, invocation),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(command: Command, invocation: Invocation) {
    let demo = match Demo::new(invocation.config) {
        Ok(demo) => demo,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            process::exit(1);
        }
    };
    tracing::info!(
        workers = demo.config().pool.worker_count(),
        runtime = %invocation.runtime,
        "running {:?}",
        command
    );

    for report in demo.run(command, invocation.runtime) {
        println!("{}", output::report_line(&report));
    }
}
