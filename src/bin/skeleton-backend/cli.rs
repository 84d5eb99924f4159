use std::net::{IpAddr, Ipv4Addr};

use clap::Parser;

// Some defaults; some of which can be overriden via CLI args
const CONFIG_FILE_PATH: &str = "./skeleton.json";
const TETHER_HOST: std::net::IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Where to load (and save) the skeleton stream config
    #[arg(long="configPath",default_value_t=String::from(CONFIG_FILE_PATH))]
    pub config_path: String,

    /// The IP address of the MQTT broker (server)
    #[arg(long = "tether.host", default_value_t=TETHER_HOST)]
    pub tether_host: std::net::IpAddr,

    /// The Agent Role (type)
    #[arg(long="tether.role",default_value_t=String::from("skeletonStream"))]
    pub agent_role: String,

    /// The Agent Group (ID)
    #[arg(long="tether.group",default_value_t=String::from("any"))]
    pub agent_group: String,

    /// Optional username for MQTT Broker
    #[arg(long = "tether.username")]
    pub tether_username: Option<String>,

    /// Optional password for MQTT Broker
    #[arg(long = "tether.password")]
    pub tether_password: Option<String>,

    /// Override smoothing, correction and prediction with a single value;
    /// 0 passes raw positions through
    #[arg(long = "smoothing")]
    pub smoothing: Option<f32>,

    /// Start processing frames immediately, instead of waiting for setEnabled
    #[arg(long = "enable")]
    pub enable: bool,

    #[arg(long = "loglevel",default_value_t=String::from("info"))]
    pub log_level: String,
}
