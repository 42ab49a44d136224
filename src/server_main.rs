use std::env::args;

use anyhow::Result;
use clap::Parser;
use clickspan::{
    server::{args::ServerArgs, resolve_port, start_server},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, SERVER_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() {
    run_service(args().collect::<Vec<_>>()).unwrap();
}

fn run_service(command_args: Vec<String>) -> Result<()> {
    let args = ServerArgs::parse_from(&command_args);

    if !args.force {
        #[cfg(unix)]
        {
            use daemonize::Daemonize;
            use tracing::error;

            let daemonize = Daemonize::new()
                .stdout(daemonize::Stdio::devnull())
                .stderr(daemonize::Stdio::devnull())
                .execute();
            match daemonize {
                daemonize::Outcome::Parent(parent) => {
                    parent
                        .inspect_err(|e| error!("Failed to detach server on parent side {e:?}"))?;
                    println!("Created server process");
                    return Ok(());
                }
                daemonize::Outcome::Child(_) => (),
            }
        }
    }

    run(args)
}

fn run(args: ServerArgs) -> Result<()> {
    let app_dir = args.dir.clone().map_or_else(create_application_default_path, Ok)?;
    enable_logging(SERVER_PREFIX, &app_dir, args.log, args.log_console)?;
    let port = resolve_port(args.port);
    single_thread_runtime()?.block_on(async move { start_server(app_dir, port).await })?;
    Ok(())
}
