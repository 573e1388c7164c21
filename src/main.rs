use std::env;
use std::process;
use wastest::config::Config;
use wastest::wast::run_file;

fn usage(prog: &str) {
    eprintln!("Usage: {prog} <script.json>... [--config <file>]");
    eprintln!();
    eprintln!("Runs JSON spec test scripts against the harness.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>   Load harness configuration from a JSON file");
    eprintln!("  -h, --help        Show this help message");
    eprintln!();
    eprintln!("Set RUST_LOG=debug to trace every load, instantiate and call.");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("wastest");

    let mut config_path = None;
    let mut scripts = Vec::new();
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                usage(prog);
                return;
            }
            "--config" => match rest.next() {
                Some(path) => config_path = Some(path.clone()),
                None => {
                    eprintln!("--config requires a file");
                    process::exit(2);
                }
            },
            _ => scripts.push(arg.clone()),
        }
    }

    if scripts.is_empty() {
        usage(prog);
        process::exit(2);
    }

    let config = match config_path {
        Some(path) => match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                process::exit(2);
            }
        },
        None => Config::default(),
    };

    let mut failed = 0;
    for script in &scripts {
        match run_file(script, &config) {
            Ok(report) if report.is_success() => println!("PASS {script}: {report}"),
            Ok(report) => {
                failed += 1;
                println!("FAIL {script}: {report}");
                for failure in &report.failures {
                    println!("  {failure}");
                }
            }
            Err(e) => {
                failed += 1;
                println!("FAIL {script}: {e}");
            }
        }
    }

    if failed > 0 {
        eprintln!("{failed} of {} script(s) failed", scripts.len());
        process::exit(1);
    }
}
