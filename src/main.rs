use tender_analytics::CliError;

fn is_json_mode_args() -> bool {
    std::env::args().any(|arg| arg == "--json")
}

fn report(err: &CliError) -> ! {
    if err.code == 0 {
        // --help / --version
        print!("{}", err.message);
        std::process::exit(0);
    }
    if is_json_mode_args() {
        eprintln!("{}", err.to_json());
    } else {
        eprintln!("{err}");
    }
    std::process::exit(err.code);
}

fn main() {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let parsed = match tender_analytics::parse_cli(raw_args) {
        Ok(parsed) => parsed,
        Err(err) => report(&err),
    };

    if let Err(err) = tender_analytics::run_with_parsed(parsed) {
        report(&err);
    }
}
