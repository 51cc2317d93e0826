fn is_json_mode_args() -> bool {
    std::env::args().any(|arg| arg == "--json")
}

fn report(err: &apod_browse::CliError) {
    if is_json_mode_args() {
        eprintln!("{}", err.to_json());
    } else {
        eprintln!("{err}");
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let parsed = match apod_browse::parse_cli(raw_args) {
        Ok(parsed) => parsed,
        Err(err) if err.code == 0 => {
            print!("{}", err.message);
            return Ok(());
        }
        Err(err) => {
            report(&err);
            std::process::exit(err.code);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match runtime.block_on(apod_browse::run_with_parsed(parsed)) {
        Ok(()) => Ok(()),
        Err(err) => {
            report(&err);
            std::process::exit(err.code);
        }
    }
}
