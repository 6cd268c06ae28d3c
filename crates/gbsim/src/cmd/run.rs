use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gbsim_svc::{load_modules, RouterConfig, SessionConfig, Simulator, SimulatorConfig};
use gbsim_transport::FunctionFs;
use tracing::info;

use crate::cmd::{parse_duration, RunArgs};
use crate::exit::{svc_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: RunArgs, verbose: bool) -> CliResult<i32> {
    let poll_interval = parse_duration(&args.poll_interval)?;
    let modules =
        load_modules(&args.config).map_err(|err| svc_error("load config failed", err))?;

    let ffs = FunctionFs::new(&args.ffs_prefix).with_data_pairs(usize::from(args.data_endpoints));
    let control = ffs
        .open_control()
        .map_err(|err| transport_error("open control endpoint failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let config = SimulatorConfig {
        poll_interval,
        session: SessionConfig {
            dump_messages: verbose,
            backend: args.backend.into(),
            router: RouterConfig {
                poll_interval,
                dump_frames: verbose,
                ..RouterConfig::default()
            },
            ..SessionConfig::default()
        },
        ..SimulatorConfig::default()
    };

    info!(
        prefix = %args.ffs_prefix.display(),
        modules = modules.len(),
        data_endpoints = args.data_endpoints,
        backend = %config.session.backend,
        "starting simulator"
    );

    let mut simulator =
        Simulator::new(control, Box::new(ffs), modules, config).with_running_flag(running);
    simulator
        .run()
        .map_err(|err| svc_error("simulator failed", err))?;

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
