use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use std::thread;
use std::time::Duration;
use tether_agent::TetherAgentOptionsBuilder;

use tether_skeleton_stream::backend_config::load_config_from_file;
use tether_skeleton_stream::frame_loop::{CycleOutcome, FrameListeners, FrameLoop};
use tether_skeleton_stream::tether_interface::{
    EncodedBodyFrame, Inputs, Outputs, TetherPublisher, handle_save_message,
    handle_set_enabled_message, publish_config,
};

mod cli;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize the logger from the environment

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level))
        .filter_module("paho_mqtt", log::LevelFilter::Warn)
        .filter_module("rumqttc", log::LevelFilter::Warn)
        .filter_module("tether_agent", log::LevelFilter::Warn)
        .init();

    debug!("Started; args: {:?}", cli);

    let mut config = load_config_from_file(&cli.config_path)?;
    if let Some(smoothing) = cli.smoothing {
        info!("Smoothing set to {} from command line", smoothing);
        config.set_uniform_smoothing(smoothing);
    }
    if cli.enable {
        config.enable_on_start = true;
    }

    let mut tether_agent = TetherAgentOptionsBuilder::new(&cli.agent_role)
        .id(Some(&cli.agent_group))
        .host(Some(&cli.tether_host.to_string()))
        .username(cli.tether_username.as_deref())
        .password(cli.tether_password.as_deref())
        .build()?;

    let inputs = Inputs::new(&mut tether_agent)?;
    let outputs = Outputs::new(&mut tether_agent)?;

    // Always publish on first start/load...
    publish_config(&config, &tether_agent, &outputs)?;

    // A bad skeleton topology fails here, before any frame is handled
    let mut listeners = FrameListeners::new();
    let listener = listeners.register(FrameLoop::new(&config)?);
    info!(
        "Skeleton stream ready; frame processing {:?}",
        listeners.get(listener).map(|l| l.state())
    );

    loop {
        let mut work_done = false;

        if let Some((topic, payload)) = tether_agent.check_messages() {
            work_done = true;

            if inputs.body_frames_input.matches(&topic) {
                let mut publisher = TetherPublisher::new(&tether_agent, &outputs);
                for (id, outcome) in listeners.notify(&EncodedBodyFrame(&payload), &mut publisher)
                {
                    match outcome {
                        CycleOutcome::EncodeFailed => {
                            warn!("Listener {} could not encode its frame", id)
                        }
                        CycleOutcome::NoFrame => debug!("Listener {}: no body data", id),
                        _ => {}
                    }
                }
            }

            if inputs.save_config_input.matches(&topic) {
                if let Err(e) = handle_save_message(
                    &payload,
                    &mut config,
                    &mut listeners,
                    &tether_agent,
                    &outputs,
                    &cli.config_path,
                ) {
                    error!("Config failed to update and save: {}", e);
                }
            }

            if inputs.set_enabled_input.matches(&topic) {
                if let Err(e) = handle_set_enabled_message(&payload, &listeners) {
                    error!("{}", e);
                }
            }
        }

        if !work_done {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
