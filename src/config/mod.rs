//! Configuration module for the compute-vm resolver.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `compute-vm.yaml`
//! - Validation of configuration values
//! - Computing fingerprints for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    AttachedDiskConfig, AttachedDiskDefaults, AttachedDiskOptions, BootDiskConfig,
    DEFAULT_BOOT_IMAGE, DEFAULT_DISK_TYPE, DEFAULT_INSTANCE_TYPE, DiskMode, DiskSourceType,
    EncryptionConfig, FirewallDirection, FirewallProtocol, FirewallRuleConfig, GroupConfig,
    InstanceConfig, InstanceOptions, InterfaceAddresses, NetworkInterfaceConfig,
    NetworkInterfaceOptions, NicType, OnHostMaintenance, SchedulingConfig, ScratchDisksConfig,
    ScratchInterface, ServiceAccountConfig, ShieldedConfig, zone_region,
};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_NAME, ENV_PROJECT_ID, ENV_ZONE, find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
