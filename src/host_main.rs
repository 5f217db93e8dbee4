use anyhow::Result;
use clap::Parser;
use prodi::{
    background::{args::HostArgs, start_host, HostOptions},
    utils::{
        dir::application_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};
use tracing::error;

fn main() -> Result<()> {
    let args = HostArgs::parse();
    let app_dir = application_path(args.dir)?;
    // Stdout belongs to the browser, logs only go to files.
    enable_logging(HOST_PREFIX, &app_dir, args.log, false)?;

    let runtime = single_thread_runtime()?;
    let result = runtime
        .block_on(start_host(
            app_dir,
            HostOptions::new(args.origin, args.activation),
        ))
        .inspect_err(|e| error!("Host stopped with an error {e:?}"));
    // Stdin is read on a blocking thread that only returns with the next frame or EOF.
    runtime.shutdown_background();
    result
}
