use clap::Parser;
use std::process::ExitCode;

use ytgrab_lib::cli::{self, Args};
use ytgrab_lib::downloader::extractors::{diagnose_error, suggestion};
use ytgrab_lib::downloader::DownloadError;
use ytgrab_lib::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);
    let using_proxy = args.uses_proxy();

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(err) = e.downcast_ref::<DownloadError>() {
                eprintln!("\n{}", err.hint());
                if let Some(reason) = diagnose_error(&err.to_string()) {
                    eprintln!("{}", suggestion(reason, using_proxy));
                }
            }
            ExitCode::FAILURE
        }
    }
}
