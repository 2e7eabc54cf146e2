pub mod cli;
pub mod config;
pub mod http;
mod schema;
mod serve;
mod telemetry;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Serve(args) => {
            telemetry::init_tracing()?;
            serve::run(args).await
        }
        cli::Command::Schema(args) => schema::run(args).await,
    }
}
