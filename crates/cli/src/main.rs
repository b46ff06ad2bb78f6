use std::process::ExitCode;

fn main() -> ExitCode {
    neubot_cli::run()
}
