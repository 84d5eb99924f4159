pub mod assembly;
pub mod orientation;
pub mod smoothing;

use anyhow::Result;
use log::info;
use orientation::{OrientationChain, SkeletonTopology};
use smoothing::JointFilter;

use crate::backend_config::BackendConfig;

pub struct Systems {
    pub joint_filter: JointFilter,
    pub orientation_chain: OrientationChain,
}

impl Systems {
    /// Fails if the skeleton topology is not a valid rooted tree; nothing can
    /// run safely without one.
    pub fn new(config: &BackendConfig) -> Result<Systems> {
        let topology = SkeletonTopology::kinect()?;
        info!(
            "Skeleton topology OK: {} bones from root {:?}",
            topology.bones().len(),
            topology.root()
        );

        let smooth_settings = config.smooth_settings();
        if smooth_settings.is_passthrough() {
            info!("Smoothing is 0; raw joint positions will be passed through");
        }

        Ok(Systems {
            joint_filter: JointFilter::new(smooth_settings),
            orientation_chain: OrientationChain::new(topology),
        })
    }
}
