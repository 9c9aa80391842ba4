use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // The stub command waits for its own shutdown signal and drains
    // connections before returning, so there is no race here.
    let result = specmock::cli::run().await;

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(specmock::errors::get_exit_code(&e))
        }
    }
}
