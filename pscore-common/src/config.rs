//! Configuration for the packet-switched core
//!
//! The configuration is read from YAML with `serde_yaml`. Every section has
//! defaults, so an empty document yields a usable core configuration.

use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Plmn, Rai};

/// Timer T3322: network-initiated detach
pub const TIMER_T3322: &str = "T3322";
/// Timer T3350: P-TMSI reallocation, attach accept, RAU accept
pub const TIMER_T3350: &str = "T3350";
/// Timer T3360: authentication and ciphering
pub const TIMER_T3360: &str = "T3360";
/// Timer T3370: identification
pub const TIMER_T3370: &str = "T3370";
/// Timer T3302: advertised in attach and RAU accepts
pub const TIMER_T3302: &str = "T3302";
/// Timer T3312: periodic routing area update, advertised in accepts
pub const TIMER_T3312: &str = "T3312";

/// Default supervision timer value in seconds (TS 24.008 table 11.3a)
pub const DEFAULT_SUPERVISION_SECS: u64 = 6;
/// Default T3302 value in seconds
pub const DEFAULT_T3302_SECS: u64 = 12 * 60;
/// Default T3312 value in seconds
pub const DEFAULT_T3312_SECS: u64 = 54 * 60;

/// Top-level core configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Mobility management settings
    #[serde(default)]
    pub gmm: GmmConfig,
    /// Session management settings
    #[serde(default)]
    pub sm: SmConfig,
    /// Subscriber directory
    #[serde(default)]
    pub subscribers: Vec<SubscriberEntry>,
}

/// GPRS mobility management settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmmConfig {
    /// Serving PLMN
    pub plmn: Plmn,
    /// Serving location area code
    pub lac: u16,
    /// Serving routing area code
    pub rac: u8,
    /// Named timer values in seconds
    pub timers: BTreeMap<String, u64>,
    /// Retransmissions of a request before the procedure is aborted
    pub max_retransmissions: u32,
    /// Authenticate on attach
    pub auth_on_attach: bool,
    /// Authenticate on routing area update
    pub auth_on_rau: bool,
    /// Authenticate on service request
    pub auth_on_service: bool,
    /// Run security-mode control after authentication
    pub smc_required: bool,
    /// Request the IMEISV after security is established
    pub imeisv_request: bool,
    /// Allocate a new P-TMSI in the attach accept
    pub ptmsi_realloc_on_attach: bool,
    /// Allocate a new P-TMSI in the RAU accept
    pub ptmsi_realloc_on_rau: bool,
    /// Reject cause for emergency attach, `None` accepts it
    pub emergency_reject_cause: Option<u8>,
    /// Reject cause when the subscriber policy refuses an IMSI
    pub imsi_reject_cause: u8,
    /// Force-to-standby indication in downlink messages
    pub force_standby: u8,
    /// Network name sent in GMM information
    pub network_name: Option<String>,
}

impl Default for GmmConfig {
    fn default() -> Self {
        Self {
            plmn: Plmn::default(),
            lac: 1,
            rac: 1,
            timers: default_timers(),
            max_retransmissions: 0,
            auth_on_attach: true,
            auth_on_rau: true,
            auth_on_service: false,
            smc_required: false,
            imeisv_request: false,
            ptmsi_realloc_on_attach: true,
            ptmsi_realloc_on_rau: true,
            emergency_reject_cause: None,
            imsi_reject_cause: 7,
            force_standby: 0,
            network_name: None,
        }
    }
}

fn default_timers() -> BTreeMap<String, u64> {
    [
        (TIMER_T3322, DEFAULT_SUPERVISION_SECS),
        (TIMER_T3350, DEFAULT_SUPERVISION_SECS),
        (TIMER_T3360, DEFAULT_SUPERVISION_SECS),
        (TIMER_T3370, DEFAULT_SUPERVISION_SECS),
        (TIMER_T3302, DEFAULT_T3302_SECS),
        (TIMER_T3312, DEFAULT_T3312_SECS),
    ]
    .into_iter()
    .map(|(name, secs)| (name.to_string(), secs))
    .collect()
}

impl GmmConfig {
    /// Returns the configured value of a named timer.
    ///
    /// Names not present in the YAML fall back to the built-in defaults.
    pub fn timer(&self, name: &str) -> Option<Duration> {
        self.timers
            .get(name)
            .copied()
            .or_else(|| default_timers().get(name).copied())
            .map(Duration::from_secs)
    }

    /// Returns the serving routing area.
    pub fn rai(&self) -> Rai {
        Rai::new(self.plmn, self.lac, self.rac)
    }
}

/// Session management settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmConfig {
    /// First address handed out from the dynamic pool
    pub pool_start: Ipv4Addr,
    /// Number of addresses in the dynamic pool
    pub pool_size: u32,
    /// Negotiated QoS profile octets (TS 24.008 10.5.6.5)
    pub qos: Vec<u8>,
    /// Radio priority for user data
    pub radio_priority: u8,
}

impl Default for SmConfig {
    fn default() -> Self {
        Self {
            pool_start: Ipv4Addr::new(10, 45, 0, 2),
            pool_size: 250,
            qos: vec![0x0B, 0x92, 0x1F],
            radio_priority: 1,
        }
    }
}

/// One entry of the subscriber directory.
///
/// An `imsi` of `"*"` matches every subscriber without an explicit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberEntry {
    /// IMSI digits, or `"*"`
    pub imsi: String,
    /// Subscriber holds a USIM (3G authentication)
    #[serde(default = "default_true")]
    pub usim: bool,
    /// MSISDN, informational
    #[serde(default)]
    pub msisdn: Option<String>,
    /// Static PDP address
    #[serde(default)]
    pub address: Option<Ipv4Addr>,
}

fn default_true() -> bool {
    true
}

impl CoreConfig {
    /// Parses a core configuration from a YAML string.
    ///
    /// # Example
    /// ```
    /// use pscore_common::CoreConfig;
    ///
    /// let yaml = r#"
    /// gmm:
    ///   lac: 42
    ///   auth_on_attach: false
    /// subscribers:
    ///   - imsi: "001010000000001"
    /// "#;
    ///
    /// let config = CoreConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.gmm.lac, 42);
    /// assert!(!config.gmm.auth_on_attach);
    /// assert!(config.subscribers[0].usim);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CoreConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a core configuration from a YAML file.
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Serializes the configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.gmm.force_standby > 7 {
            return Err(Error::Config(format!(
                "force_standby {} does not fit in 3 bits",
                self.gmm.force_standby
            )));
        }
        if self.sm.radio_priority > 7 {
            return Err(Error::Config(format!(
                "radio_priority {} does not fit in 3 bits",
                self.sm.radio_priority
            )));
        }
        if self.sm.qos.is_empty() || self.sm.qos.len() > 255 {
            return Err(Error::Config("qos profile must hold 1..=255 octets".into()));
        }
        for entry in &self.subscribers {
            let valid = entry.imsi == "*"
                || ((6..=15).contains(&entry.imsi.len())
                    && entry.imsi.bytes().all(|b| b.is_ascii_digit()));
            if !valid {
                return Err(Error::Config(format!("invalid IMSI: {}", entry.imsi)));
            }
        }
        Ok(())
    }
}
