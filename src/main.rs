use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    celene_search::init_logging();

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let Some(documents_path) = args.next() else {
        eprintln!("usage: celene-search <documents.json> [config.json]");
        return ExitCode::from(2);
    };
    let config_path = args.next();

    match celene_search::run(&documents_path, config_path.as_deref()) {
        Ok((indexed, total)) => {
            println!("indexed {}/{}", indexed, total);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
