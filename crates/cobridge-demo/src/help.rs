// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Help text for the demo binary.

use crate::output;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn print_usage() {
    println!(
        "{} {} - async results handed across runtimes",
        output::title("cobridge-demo"),
        output::version(VERSION)
    );
    println!();
    println!(
        "{}: {} {} {}",
        output::section_header("Usage"),
        output::command("cobridge-demo"),
        output::arg("[command]"),
        output::arg("[options]")
    );
    println!();
    println!("{}", output::section_header("Commands:"));
    println!("  {}           Parallel dot product", output::command("dot"));
    println!("  {}     Coroutine and pool tasks awaiting each other", output::command("ping-pong"));
    println!("  {}   A producer that always fails", output::command("not-product"));
    println!("  {}           Everything above (default)", output::command("all"));
    println!("  {}          Show this help", output::command("help"));
    println!("  {}       Show version", output::command("version"));
    println!();
    println!("{}", output::section_header("Options:"));
    println!("  {} {}      Dot product vector length (16384)", output::arg("--size"), output::arg("<n>"));
    println!("  {} {}     Largest range summed directly (32)", output::arg("--split"), output::arg("<n>"));
    println!("  {} {}     Ping-pong legs (4)", output::arg("--limit"), output::arg("<n>"));
    println!("  {} {}   Pool threads (COBRIDGE_WORKERS, else CPU count)", output::arg("--workers"), output::arg("<n>"));
    println!("  {} {}  coro, pool, structured or all", output::arg("--runtime"), output::arg("<rt>"));
    println!();
    println!("Set {} to control log output.", output::arg("RUST_LOG"));
}
