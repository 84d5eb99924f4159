use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use tether_agent::{ChannelDefinition, ChannelOptionsBuilder, TetherAgent};

use crate::{
    backend_config::BackendConfig,
    frame_loop::{FrameListeners, FrameReference, LoopState},
    publisher::{Publisher, SKELETON_CHANNEL},
    tracking::BodyFrame,
};

pub struct Outputs {
    pub config_output: ChannelDefinition,
    pub skeleton_output: ChannelDefinition,
}

impl Outputs {
    pub fn new(tether_agent: &mut TetherAgent) -> Result<Outputs> {
        let config_output = ChannelOptionsBuilder::create_sender("provideSkeletonConfig")
            .qos(Some(2))
            .retain(Some(true))
            .build(tether_agent)
            .map_err(|e| anyhow!("failed to create config Output: {}", e))?;

        // Skeleton frames go out at sensor rate; never wait on delivery
        let skeleton_output = ChannelOptionsBuilder::create_sender(SKELETON_CHANNEL)
            .qos(Some(0))
            .build(tether_agent)
            .map_err(|e| anyhow!("failed to create skeleton Output: {}", e))?;

        Ok(Outputs {
            config_output,
            skeleton_output,
        })
    }
}

pub struct Inputs {
    pub body_frames_input: ChannelDefinition,
    pub save_config_input: ChannelDefinition,
    pub set_enabled_input: ChannelDefinition,
}

impl Inputs {
    pub fn new(tether_agent: &mut TetherAgent) -> Result<Inputs> {
        let body_frames_input = ChannelOptionsBuilder::create_receiver("bodyFrames")
            .qos(Some(0))
            .build(tether_agent)
            .map_err(|e| anyhow!("failed to create bodyFrames Input: {}", e))?;
        let save_config_input = ChannelOptionsBuilder::create_receiver("saveSkeletonConfig")
            .qos(Some(2))
            .build(tether_agent)
            .map_err(|e| anyhow!("failed to create saveSkeletonConfig Input: {}", e))?;
        let set_enabled_input = ChannelOptionsBuilder::create_receiver("setEnabled")
            .qos(Some(2))
            .build(tether_agent)
            .map_err(|e| anyhow!("failed to create setEnabled Input: {}", e))?;

        Ok(Inputs {
            body_frames_input,
            save_config_input,
            set_enabled_input,
        })
    }
}

/// Publishes through the Tether agent. Send failures are logged and the
/// message is dropped.
pub struct TetherPublisher<'a> {
    tether_agent: &'a TetherAgent,
    outputs: &'a Outputs,
}

impl<'a> TetherPublisher<'a> {
    pub fn new(tether_agent: &'a TetherAgent, outputs: &'a Outputs) -> Self {
        TetherPublisher {
            tether_agent,
            outputs,
        }
    }
}

impl Publisher for TetherPublisher<'_> {
    fn publish(&mut self, channel: &str, payload: &[u8]) {
        if channel != SKELETON_CHANNEL {
            warn!("No Tether Output for channel \"{}\"; message dropped", channel);
            return;
        }
        if let Err(e) = self
            .tether_agent
            .send(&self.outputs.skeleton_output, Some(payload))
        {
            warn!("Failed to publish skeleton frame, dropped: {}", e);
        }
    }
}

/// A MessagePack-encoded `BodyFrame` as received on the bodyFrames plug.
/// Acquiring decodes it; a payload that does not decode holds no frame.
pub struct EncodedBodyFrame<'a>(pub &'a [u8]);

impl FrameReference for EncodedBodyFrame<'_> {
    type Frame = BodyFrame;

    fn acquire_frame(&self) -> Option<BodyFrame> {
        match rmp_serde::from_slice::<BodyFrame>(self.0) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Could not decode body frame: {}", e);
                None
            }
        }
    }
}

pub fn publish_config(
    config: &BackendConfig,
    tether_agent: &TetherAgent,
    outputs: &Outputs,
) -> Result<()> {
    let payload = rmp_serde::to_vec_named(config)?;
    tether_agent
        .send(&outputs.config_output, Some(&payload))
        .map_err(|e| anyhow!("failed to publish config: {}", e))
}

pub fn handle_save_message(
    payload: &[u8],
    config: &mut BackendConfig,
    listeners: &mut FrameListeners,
    tether_agent: &TetherAgent,
    outputs: &Outputs,
    config_file_path: &str,
) -> Result<()> {
    config
        .parse_remote_config(payload)
        .map_err(|e| anyhow!("Handle save-message failure: {e}"))?;

    info!("Remote-provided config parsed OK; apply, save to disk and (re) publish");
    listeners.apply_config(config);
    config.write_config_to_file(config_file_path)?;
    publish_config(config, tether_agent, outputs)
}

pub fn handle_set_enabled_message(payload: &[u8], listeners: &FrameListeners) -> Result<()> {
    let enabled: bool = rmp_serde::from_slice(payload)
        .map_err(|e| anyhow!("setEnabled payload is not a boolean: {}", e))?;
    info!("setEnabled: {}", enabled);
    listeners.set_state(if enabled {
        LoopState::Enabled
    } else {
        LoopState::Disabled
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Body, JointKind, Position3D, TrackingState};

    #[test]
    fn encoded_frame_decodes_on_acquire() {
        let frame: BodyFrame = vec![Body::new(1001, true).with_joint(
            JointKind::Neck,
            Position3D::new(0., 0.4, 2.),
            TrackingState::Inferred,
        )];
        let payload = rmp_serde::to_vec_named(&frame).unwrap();
        let acquired = EncodedBodyFrame(&payload).acquire_frame().unwrap();
        assert_eq!(acquired[0].tracking_id, 1001);
        assert_eq!(
            acquired[0].joints[&JointKind::Neck].tracking_state,
            TrackingState::Inferred
        );
    }

    #[test]
    fn garbage_payload_holds_no_frame() {
        assert!(EncodedBodyFrame(&[0xc1, 0x00]).acquire_frame().is_none());
    }

    #[test]
    fn set_enabled_toggles_every_listener() {
        let config = BackendConfig::default();
        let mut listeners = FrameListeners::new();
        let a = listeners.register(crate::frame_loop::FrameLoop::new(&config).unwrap());
        let b = listeners.register(crate::frame_loop::FrameLoop::new(&config).unwrap());

        let on = rmp_serde::to_vec(&true).unwrap();
        handle_set_enabled_message(&on, &listeners).unwrap();
        assert_eq!(listeners.get(a).unwrap().state(), LoopState::Enabled);
        assert_eq!(listeners.get(b).unwrap().state(), LoopState::Enabled);

        let off = rmp_serde::to_vec(&false).unwrap();
        handle_set_enabled_message(&off, &listeners).unwrap();
        assert_eq!(listeners.get(a).unwrap().state(), LoopState::Disabled);

        assert!(handle_set_enabled_message(b"nope", &listeners).is_err());
    }
}
