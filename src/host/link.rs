//! # Host Transport
//!
//! The host simulator (a VMM such as QEMU or Cloud Hypervisor) connects to the harness with the
//! vfio-user protocol over a Unix domain socket. This module parses the startup descriptor that
//! names the socket and sets up the vfio-user server with the regions the endpoint exposes.

use std::{
    fmt::{self, Debug, Formatter},
    mem::size_of,
    path::PathBuf,
    str::FromStr,
};

use thiserror::Error;
use tracing::info;
use vfio_bindings::bindings::vfio::{
    vfio_region_info, VFIO_PCI_BAR5_REGION_INDEX, VFIO_PCI_CONFIG_REGION_INDEX, VFIO_PCI_NUM_IRQS,
    VFIO_PCI_NUM_REGIONS, VFIO_REGION_INFO_FLAG_READ, VFIO_REGION_INFO_FLAG_WRITE,
};
use vfio_user::{IrqInfo, Server, ServerBackend, ServerRegion};

use crate::device::{
    pci::constants::config_space,
    region::{Access, RegionTable},
};

/// Failures to reach the host simulator. These are always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No descriptor was given.
    #[error("No transport descriptor given")]
    Missing,

    /// The descriptor cannot be understood.
    #[error("Malformed transport descriptor {descriptor:?}: {reason}")]
    Malformed {
        /// The descriptor as given.
        descriptor: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The listening socket could not be created.
    #[error("Failed to listen on {}: {message}", path.display())]
    Listen {
        /// The socket path.
        path: PathBuf,
        /// The underlying error.
        message: String,
    },

    /// The connection to the host failed.
    #[error("vfio-user connection failed: {message}")]
    Link {
        /// The underlying error.
        message: String,
    },
}

/// Where the host simulator connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportDescriptor {
    /// A Unix domain socket the harness listens on.
    UnixSocket(PathBuf),
}

impl FromStr for TransportDescriptor {
    type Err = TransportError;

    /// Parse `unix:<path>` or a bare path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| TransportError::Malformed {
            descriptor: s.to_string(),
            reason,
        };

        if s.is_empty() {
            return Err(TransportError::Missing);
        }

        match s.split_once(':') {
            Some(("unix", "")) => Err(malformed("empty socket path")),
            Some(("unix", path)) => Ok(Self::UnixSocket(path.into())),
            // Anything before a colon that could be a URI scheme is one. Paths
            // may contain colons, but not in a leading component without slashes.
            Some((scheme, _))
                if !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) =>
            {
                Err(malformed("unsupported transport scheme"))
            }
            _ => Ok(Self::UnixSocket(s.into())),
        }
    }
}

/// The region list for [`vfio_user::Server::new`].
///
/// The configuration region is always present. BAR regions exist for the regions in `regions`.
/// Nothing is mappable, so every access reaches the harness as a message.
#[must_use]
pub fn region_infos(regions: &RegionTable) -> Vec<ServerRegion> {
    let argsz = size_of::<vfio_region_info>() as u32;

    (0..VFIO_PCI_NUM_REGIONS)
        .map(|index| {
            let region = u8::try_from(index)
                .ok()
                .filter(|_| index <= VFIO_PCI_BAR5_REGION_INDEX)
                .and_then(|id| regions.lookup(id));

            let region_info = match (index, region) {
                (VFIO_PCI_CONFIG_REGION_INDEX, _) => vfio_region_info {
                    argsz,
                    index,
                    size: config_space::SIZE as u64,
                    flags: VFIO_REGION_INFO_FLAG_READ | VFIO_REGION_INFO_FLAG_WRITE,
                    ..Default::default()
                },

                (_, Some(region)) => vfio_region_info {
                    argsz,
                    index,
                    size: region.size.into(),
                    flags: match region.access {
                        Access::ReadOnly => VFIO_REGION_INFO_FLAG_READ,
                        Access::ReadWrite => {
                            VFIO_REGION_INFO_FLAG_READ | VFIO_REGION_INFO_FLAG_WRITE
                        }
                    },
                    ..Default::default()
                },

                _ => vfio_region_info {
                    argsz,
                    index,
                    ..Default::default()
                },
            };

            ServerRegion {
                region_info,
                sparse_areas: Vec::new(),
                mmap_fd: None,
            }
        })
        .collect()
}

/// The IRQ list for [`vfio_user::Server::new`]. The endpoint signals no interrupts.
#[must_use]
pub fn irq_infos() -> Vec<IrqInfo> {
    (0..VFIO_PCI_NUM_IRQS)
        .map(|index| IrqInfo {
            index,
            count: 0,
            flags: 0,
        })
        .collect()
}

/// The vfio-user connection to the host simulator.
pub struct HostLink {
    path: PathBuf,
    server: Server,
}

impl Debug for HostLink {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HostLink {
    /// Create the listening socket described by `descriptor`.
    pub fn listen(
        descriptor: &TransportDescriptor,
        regions: &RegionTable,
    ) -> Result<Self, TransportError> {
        let TransportDescriptor::UnixSocket(path) = descriptor;

        info!("Waiting for vfio-user connection on {}", path.display());

        let server = Server::new(path, true, irq_infos(), region_infos(regions)).map_err(|e| {
            TransportError::Listen {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            path: path.clone(),
            server,
        })
    }

    /// Serve host requests with `backend` until the host disconnects.
    pub fn serve(&mut self, backend: &mut dyn ServerBackend) -> Result<(), TransportError> {
        self.server
            .run(backend)
            .map_err(|e| TransportError::Link {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use vfio_bindings::bindings::vfio::{VFIO_PCI_BAR0_REGION_INDEX, VFIO_PCI_BAR2_REGION_INDEX};

    use super::*;
    use crate::device::region::{RegionKind, RegionTableBuilder};

    #[test]
    fn descriptors_are_parsed() {
        assert_eq!(
            "unix:/tmp/cosim.sock".parse::<TransportDescriptor>(),
            Ok(TransportDescriptor::UnixSocket("/tmp/cosim.sock".into()))
        );
        assert_eq!(
            "/tmp/cosim.sock".parse::<TransportDescriptor>(),
            Ok(TransportDescriptor::UnixSocket("/tmp/cosim.sock".into()))
        );
        assert_eq!(
            "/tmp/with:colon".parse::<TransportDescriptor>(),
            Ok(TransportDescriptor::UnixSocket("/tmp/with:colon".into()))
        );
    }

    #[test]
    fn bad_descriptors_are_rejected() {
        assert_eq!(
            "".parse::<TransportDescriptor>(),
            Err(TransportError::Missing)
        );
        assert!(matches!(
            "tcp:localhost:1234".parse::<TransportDescriptor>(),
            Err(TransportError::Malformed { .. })
        ));
        assert!(matches!(
            "unix:".parse::<TransportDescriptor>(),
            Err(TransportError::Malformed { .. })
        ));
    }

    #[test]
    fn regions_are_announced_to_the_host() {
        let regions = RegionTableBuilder::new()
            .region(0, RegionKind::UserBar, 0x40000, Access::ReadWrite)
            .region(1, RegionKind::Config, 0x1000, Access::ReadOnly)
            .build()
            .unwrap();
        let infos: Vec<_> = region_infos(&regions)
            .into_iter()
            .map(|region| region.region_info)
            .collect();

        assert_eq!(infos.len(), VFIO_PCI_NUM_REGIONS as usize);
        assert_eq!(infos[VFIO_PCI_BAR0_REGION_INDEX as usize].size, 0x40000);
        assert_eq!(infos[1].size, 0x1000);
        assert_eq!(infos[1].flags, VFIO_REGION_INFO_FLAG_READ);
        assert_eq!(infos[VFIO_PCI_BAR2_REGION_INDEX as usize].size, 0);
        assert_eq!(infos[VFIO_PCI_CONFIG_REGION_INDEX as usize].size, 256);
        assert!(infos.iter().enumerate().all(|(i, info)| info.index as usize == i));
    }

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pcie-cosim-{}-{name}.sock", std::process::id()))
    }

    fn endpoint_regions() -> RegionTable {
        RegionTableBuilder::new()
            .region(0, RegionKind::UserBar, 0x40000, Access::ReadWrite)
            .build()
            .unwrap()
    }

    #[test]
    fn listening_creates_the_socket_until_dropped() {
        let path = socket_path("listen");
        let descriptor = TransportDescriptor::UnixSocket(path.clone());
        let link = HostLink::listen(&descriptor, &endpoint_regions()).unwrap();

        assert!(path.exists());
        drop(link);
        assert!(!path.exists());
    }

    #[test]
    fn occupied_socket_paths_cannot_be_listened_on() {
        let path = socket_path("occupied");
        std::fs::write(&path, b"").unwrap();

        let descriptor = TransportDescriptor::UnixSocket(path.clone());
        let result = HostLink::listen(&descriptor, &endpoint_regions());
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            result,
            Err(TransportError::Listen { path: failed, .. }) if failed == path
        ));
    }

    #[test]
    fn sockets_in_missing_directories_cannot_be_listened_on() {
        let path = std::env::temp_dir()
            .join(format!("pcie-cosim-missing-{}", std::process::id()))
            .join("cosim.sock");

        assert!(matches!(
            HostLink::listen(&TransportDescriptor::UnixSocket(path), &endpoint_regions()),
            Err(TransportError::Listen { .. })
        ));
    }

    #[test]
    fn no_interrupts_are_announced() {
        assert!(irq_infos().iter().all(|irq| irq.count == 0));
    }
}
