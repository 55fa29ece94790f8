use clap::Parser;
use vacuum_controller::{run, Cli};
use vacuum_controller::error::{AppRunError, ConfigError};

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();

    match run(cli).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("This application has already been started");
            Ok(())
        },
        Err(AppRunError::DeviceError { source }) if source.is_permission_denied() => {
            eprintln!("Bluetooth access was denied; grant this program permission to use Bluetooth");
            Err(AppRunError::DeviceError { source })
        },
        Err(err) => {
            eprintln!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
