//! # PCI Constants
//!
//! This module collects PCI related constants. All definitions are derived from the PCI
//! Spec, either the "PCI Local Bus Specification" or newer "PCI Express Base Specification"
//! documents.

// Allow missing docs to avoid duplicating the PCI spec for all constants.
#![allow(missing_docs)]

/// Constants related to the configuration space.
pub mod config_space {

    /// The config space size of a single PCI device in bytes.
    pub const SIZE: usize = 256;

    /// The maximum number of Base Address Registers (BARs) per device.
    pub const MAX_BARS: usize = 6;

    /// Masks for various configuration space fields.
    pub mod mask {
        pub const CAPABILITIES_POINTER: u8 = 0xfc;
    }

    /// The offsets of various fields in the configuration space.
    pub mod offset {
        pub const VENDOR: usize = 0x0;
        pub const DEVICE: usize = 0x2;
        pub const COMMAND: usize = 0x4;
        pub const STATUS: usize = 0x6;
        pub const REVISION: usize = 0x8;
        pub const PROG_IF: usize = 0x9;
        pub const SUBCLASS: usize = 0xA;
        pub const CLASS: usize = 0xB;
        pub const CACHE_LINE_SIZE: usize = 0xC;
        pub const LATENCY_TIMER: usize = 0xD;
        pub const HEADER_TYPE: usize = 0xE;
        pub const BIST: usize = 0xF;

        pub const BAR_0: usize = 0x10;
        pub const BAR_1: usize = 0x14;

        pub const SUBSYSTEM_VENDOR_ID: usize = 0x2C;
        pub const SUBSYSTEM_ID: usize = 0x2E;
        pub const ROM_BAR: usize = 0x30;
        pub const CAPABILITIES_POINTER: usize = 0x34;
        pub const IRQ_LINE: usize = 0x3C;
        pub const IRQ_PIN: usize = 0x3D;
        pub const MIN_GNT: usize = 0x3E;
        pub const MAX_LAT: usize = 0x3F;
    }

    /// The device vendor.
    pub mod vendor {
        pub const XILINX: u16 = 0x10EE;
    }

    pub mod device {
        /// The XDMA endpoint function.
        pub const XILINX_XDMA: u16 = 0x903F;

        /// The subsystem ID the XDMA IP reports by default.
        pub const XILINX_XDMA_SUBSYSTEM: u16 = 0x000A;
    }

    /// Command Register Constants.
    pub mod command {
        pub const WRITABLE_BITS: u16 = 0x077F;
    }

    /// Status Register Constants.
    pub mod status {
        /// The device has a list of capabilities starting at
        /// [`CAPABILITIES_POINTER`](super::offset::CAPABILITIES_POINTER).
        pub const CAPABILITIES: u16 = 1 << 4;
    }

    /// PCI class constants.
    pub mod class {
        pub const NETWORK: u8 = 0x02;
    }

    /// PCI sub-class constants.
    pub mod subclass {
        pub const NETWORK_ETHERNET: u8 = 0x00;
    }

    /// PCI header type.
    pub mod header_type {
        pub const TYPE_00: u8 = 0;
    }

    /// IDs for PCI Capabilities.
    pub mod capability_id {
        pub const POWER_MANAGEMENT: u8 = 0x01;
        pub const PCI_EXPRESS: u8 = 0x10;
    }

    /// Constants for the Power Management capability.
    pub mod pm {
        /// Size of the capability body after the generic header.
        pub const BODY_SIZE: usize = 6;

        /// The offset of the capabilities register in the body.
        pub const PMC: usize = 0;
        /// The offset of the control/status register in the body.
        pub const PMCSR: usize = 2;

        /// Capabilities register: version 1.2 of the PM interface.
        pub const PMC_VERSION_1_2: u16 = 0x0003;

        pub mod pmcsr {
            /// The power state field (D0 to D3hot).
            pub const POWER_STATE: u16 = 0b11;
            /// The PME status bit.
            pub const PME_STATUS: u16 = 1 << 15;
        }
    }

    /// Constants for the PCI Express capability.
    pub mod pcie {
        /// Size of the capability body after the generic header.
        pub const BODY_SIZE: usize = 0x3C - 2;

        /// Offsets of the registers in the body.
        pub const FLAGS: usize = 0x0;
        pub const DEVCAP: usize = 0x2;
        pub const DEVCTL: usize = 0x6;
        pub const DEVSTA: usize = 0x8;
        pub const LNKCAP: usize = 0xA;
        pub const LNKCTL: usize = 0xE;
        pub const LNKSTA: usize = 0x10;

        /// Capability version 2, device/port type "PCI Express Endpoint".
        pub const FLAGS_V2_ENDPOINT: u16 = 0x0002;

        pub mod devcap {
            /// Role-based error reporting.
            pub const RBER: u32 = 0x8000;
        }

        pub mod devsta {
            /// The correctable, non-fatal, fatal and unsupported request error bits.
            pub const ERRORS: u16 = 0x000F;
        }

        pub mod lnkcap {
            /// Maximum link speed 2.5 GT/s.
            pub const SLS_2_5GB: u32 = 0x1;
            /// Maximum link width x1.
            pub const MLW_X1: u32 = 1 << 4;
            /// ASPM L0s support.
            pub const ASPM_L0S: u32 = 0x400;
        }

        pub mod lnksta {
            /// Current link speed 2.5 GT/s.
            pub const CLS_2_5GB: u16 = 0x1;
            /// Negotiated link width x1.
            pub const NLW_X1: u16 = 0x10;
        }
    }
}
