//! Closed set of emulator types and their per-type schemas.
//!
//! Each node type maps to a static descriptor: the URL path segment used
//! when addressing the compute, and the allow-list of property keys the
//! compute cares about. Any property key absent from the allow-list is
//! controller-only and is never forwarded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// The emulator backing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Virtual PC simulator.
    Vpcs,
    /// QEMU virtual machine.
    Qemu,
    /// Cisco IOS router emulated by Dynamips.
    Dynamips,
    /// Cisco IOU instance.
    Iou,
    /// Docker container.
    Docker,
    /// Cloud bridge to the host network.
    Cloud,
    /// NAT gateway to the host network.
    Nat,
    /// Built-in Ethernet switch.
    EthernetSwitch,
    /// Built-in Ethernet hub.
    EthernetHub,
}

/// Static per-type descriptor.
pub struct NodeTypeSchema {
    /// URL path segment for compute requests (`/projects/{id}/{segment}/nodes`).
    pub path_segment: &'static str,
    /// Property keys dispatched to the compute. Everything else stays
    /// controller-side.
    pub compute_properties: &'static [&'static str],
}

static VPCS: NodeTypeSchema = NodeTypeSchema {
    path_segment: "vpcs",
    compute_properties: &["startup_script", "startup_script_path"],
};

static QEMU: NodeTypeSchema = NodeTypeSchema {
    path_segment: "qemu",
    compute_properties: &[
        "qemu_path",
        "platform",
        "ram",
        "cpus",
        "adapters",
        "adapter_type",
        "mac_address",
        "hda_disk_image",
        "hdb_disk_image",
        "hdc_disk_image",
        "hdd_disk_image",
        "cdrom_image",
        "bios_image",
        "initrd",
        "kernel_image",
        "kernel_command_line",
        "boot_priority",
        "options",
        "cpu_throttling",
        "process_priority",
    ],
};

static DYNAMIPS: NodeTypeSchema = NodeTypeSchema {
    path_segment: "dynamips",
    compute_properties: &[
        "platform",
        "image",
        "ram",
        "nvram",
        "mmap",
        "sparsemem",
        "idlepc",
        "idlemax",
        "exec_area",
        "disk0",
        "disk1",
        "auto_delete_disks",
        "system_id",
        "slot0",
        "slot1",
        "slot2",
        "slot3",
        "slot4",
        "slot5",
        "slot6",
        "wic0",
        "wic1",
        "wic2",
    ],
};

static IOU: NodeTypeSchema = NodeTypeSchema {
    path_segment: "iou",
    compute_properties: &[
        "path",
        "md5sum",
        "serial_adapters",
        "ethernet_adapters",
        "ram",
        "nvram",
        "use_default_iou_values",
        "startup_config",
        "private_config",
        "l1_keepalives",
        "application_id",
    ],
};

static DOCKER: NodeTypeSchema = NodeTypeSchema {
    path_segment: "docker",
    compute_properties: &[
        "image",
        "adapters",
        "start_command",
        "environment",
        "console_resolution",
        "console_http_port",
        "console_http_path",
        "extra_hosts",
    ],
};

static CLOUD: NodeTypeSchema = NodeTypeSchema {
    path_segment: "cloud",
    compute_properties: &["ports_mapping", "remote_console_host"],
};

static NAT: NodeTypeSchema = NodeTypeSchema {
    path_segment: "nat",
    compute_properties: &["ports_mapping"],
};

static ETHERNET_SWITCH: NodeTypeSchema = NodeTypeSchema {
    path_segment: "ethernet_switch",
    compute_properties: &["ports_mapping"],
};

static ETHERNET_HUB: NodeTypeSchema = NodeTypeSchema {
    path_segment: "ethernet_hub",
    compute_properties: &["ports_mapping"],
};

impl NodeType {
    /// The static schema for this type.
    #[must_use]
    pub fn schema(self) -> &'static NodeTypeSchema {
        match self {
            Self::Vpcs => &VPCS,
            Self::Qemu => &QEMU,
            Self::Dynamips => &DYNAMIPS,
            Self::Iou => &IOU,
            Self::Docker => &DOCKER,
            Self::Cloud => &CLOUD,
            Self::Nat => &NAT,
            Self::EthernetSwitch => &ETHERNET_SWITCH,
            Self::EthernetHub => &ETHERNET_HUB,
        }
    }

    /// The URL path segment for compute requests.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        self.schema().path_segment
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for NodeType {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vpcs" => Ok(Self::Vpcs),
            "qemu" => Ok(Self::Qemu),
            "dynamips" => Ok(Self::Dynamips),
            "iou" => Ok(Self::Iou),
            "docker" => Ok(Self::Docker),
            "cloud" => Ok(Self::Cloud),
            "nat" => Ok(Self::Nat),
            "ethernet_switch" => Ok(Self::EthernetSwitch),
            "ethernet_hub" => Ok(Self::EthernetHub),
            other => Err(ControllerError::UnknownNodeType(other.to_string())),
        }
    }
}
