//! Global registry bookkeeping and capability negotiation.
//!
//! The server announces its globals during the initial round-trip. Each one
//! this client recognises is bound once, at the lower of the advertised
//! version and the version configured in [`ProtocolConfig`]. Removal of an
//! already-bound global is logged and otherwise ignored; there is no
//! hot-unbind.

use super::Capability;
use crate::config::ProtocolConfig;
use log::{debug, info, warn};

/// A global this client has bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundGlobal {
    /// Registry name the server assigned
    pub name: u32,
    /// Negotiated version
    pub version: u32,
}

/// The set of capabilities bound on a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    compositor: Option<BoundGlobal>,
    shm: Option<BoundGlobal>,
    wm_base: Option<BoundGlobal>,
    seat: Option<BoundGlobal>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, capability: Capability) -> Option<BoundGlobal> {
        match capability {
            Capability::Compositor => self.compositor,
            Capability::Shm => self.shm,
            Capability::WmBase => self.wm_base,
            Capability::Seat => self.seat,
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.get(capability).is_some()
    }

    fn slot_mut(&mut self, capability: Capability) -> &mut Option<BoundGlobal> {
        match capability {
            Capability::Compositor => &mut self.compositor,
            Capability::Shm => &mut self.shm,
            Capability::WmBase => &mut self.wm_base,
            Capability::Seat => &mut self.seat,
        }
    }

    /// Interface names of required capabilities that are still unbound
    pub fn missing_required(&self) -> Vec<&'static str> {
        Capability::ALL
            .into_iter()
            .filter(|capability| capability.is_required() && !self.has(*capability))
            .map(|capability| capability.interface())
            .collect()
    }

    /// Record an announced global. Returns the capability and clamped version
    /// to bind, or `None` when the global is unknown or already bound.
    pub fn on_global_added(
        &mut self,
        name: u32,
        interface: &str,
        version: u32,
        config: &ProtocolConfig,
    ) -> Option<(Capability, u32)> {
        let Some(capability) = Capability::from_interface(interface) else {
            debug!("Ignoring global {} ({} v{})", name, interface, version);
            return None;
        };

        let slot = self.slot_mut(capability);
        if let Some(bound) = slot {
            warn!(
                "Ignoring additional {} global {} (already bound name {})",
                interface, name, bound.name
            );
            return None;
        }

        let negotiated = version.min(built_version(config, capability));
        *slot = Some(BoundGlobal {
            name,
            version: negotiated,
        });

        info!(
            "🔗 Binding {} (name {}, server v{}, using v{})",
            interface, name, version, negotiated
        );
        Some((capability, negotiated))
    }

    /// Returns the capability the removed global was bound as, if any.
    /// The binding itself stays in place.
    pub fn on_global_removed(&self, name: u32) -> Option<Capability> {
        let capability = Capability::ALL
            .into_iter()
            .find(|capability| self.get(*capability).map(|bound| bound.name) == Some(name))?;
        warn!(
            "Server removed bound global {} ({}); keeping existing binding",
            name,
            capability.interface()
        );
        Some(capability)
    }
}

/// Version this client was built against for a capability
pub fn built_version(config: &ProtocolConfig, capability: Capability) -> u32 {
    match capability {
        Capability::Compositor => config.compositor_version,
        Capability::Shm => config.shm_version,
        Capability::WmBase => config.wm_base_version,
        Capability::Seat => config.seat_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_clamped_to_built_version() {
        let config = ProtocolConfig::default();
        let mut caps = Capabilities::new();

        let bound = caps.on_global_added(1, "wl_compositor", 6, &config);
        assert_eq!(bound, Some((Capability::Compositor, 4)));

        let bound = caps.on_global_added(2, "wl_seat", 5, &config);
        assert_eq!(bound, Some((Capability::Seat, 5)));

        assert_eq!(
            caps.get(Capability::Compositor),
            Some(BoundGlobal { name: 1, version: 4 })
        );
    }

    #[test]
    fn test_unknown_and_duplicate_globals_are_not_bound() {
        let config = ProtocolConfig::default();
        let mut caps = Capabilities::new();

        assert_eq!(caps.on_global_added(1, "wl_output", 4, &config), None);
        assert!(caps.on_global_added(2, "wl_shm", 1, &config).is_some());
        assert_eq!(caps.on_global_added(3, "wl_shm", 1, &config), None);
        assert_eq!(caps.get(Capability::Shm).map(|b| b.name), Some(2));
    }

    #[test]
    fn test_missing_required_ignores_seat() {
        let config = ProtocolConfig::default();
        let mut caps = Capabilities::new();
        assert_eq!(
            caps.missing_required(),
            vec!["wl_compositor", "wl_shm", "xdg_wm_base"]
        );

        caps.on_global_added(1, "wl_compositor", 4, &config);
        caps.on_global_added(2, "wl_shm", 1, &config);
        assert_eq!(caps.missing_required(), vec!["xdg_wm_base"]);

        caps.on_global_added(3, "xdg_wm_base", 3, &config);
        assert!(caps.missing_required().is_empty());
        assert!(!caps.has(Capability::Seat));
    }

    #[test]
    fn test_removal_keeps_binding() {
        let config = ProtocolConfig::default();
        let mut caps = Capabilities::new();
        caps.on_global_added(7, "xdg_wm_base", 1, &config);

        assert_eq!(caps.on_global_removed(7), Some(Capability::WmBase));
        assert_eq!(caps.on_global_removed(8), None);
        assert!(caps.has(Capability::WmBase));
    }
}
