// SPDX-License-Identifier: MIT
//
// Compositor configuration.
//
// Everything here is chosen once at construction. There is no file format;
// the session layer builds a config in code (or from its own arguments) and
// hands it to `Compositor::new`.

/// What happens when a drawable's rect does not fit inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoundsPolicy {
    /// Attach and resize fail with `OutOfBounds`, and so does a render
    /// request that misses the terminal entirely.
    Strict,
    /// Anything goes; the excess is clipped away at render time.
    #[default]
    Permissive,
}

impl BoundsPolicy {
    #[inline]
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Per-container attach behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerPolicy {
    /// New children go to index 0 (topmost) instead of the bottom.
    pub insert_new_on_top: bool,
    /// A focusable new child takes focus on attach.
    pub focus_on_attach: bool,
}

impl Default for ContainerPolicy {
    fn default() -> Self {
        Self {
            insert_new_on_top: true,
            focus_on_attach: true,
        }
    }
}

/// Compositor-wide settings.
///
/// # Examples
///
/// ```
/// use n_comp::config::{BoundsPolicy, CompositorConfig};
///
/// let config = CompositorConfig::default()
///     .with_bounds(BoundsPolicy::Strict)
///     .with_synchronized_output(false);
/// assert!(config.bounds.is_strict());
/// assert!(config.root.insert_new_on_top);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositorConfig {
    pub bounds: BoundsPolicy,
    /// Policy of the root container.
    pub root: ContainerPolicy,
    /// Wrap each frame in DEC 2026 synchronized output, for sinks that
    /// support it.
    pub synchronized_output: bool,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            bounds: BoundsPolicy::Permissive,
            root: ContainerPolicy::default(),
            synchronized_output: true,
        }
    }
}

impl CompositorConfig {
    #[must_use]
    pub const fn with_bounds(mut self, bounds: BoundsPolicy) -> Self {
        self.bounds = bounds;
        self
    }

    #[must_use]
    pub const fn with_root_policy(mut self, root: ContainerPolicy) -> Self {
        self.root = root;
        self
    }

    #[must_use]
    pub const fn with_synchronized_output(mut self, enabled: bool) -> Self {
        self.synchronized_output = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CompositorConfig::default();
        assert_eq!(config.bounds, BoundsPolicy::Permissive);
        assert!(config.root.insert_new_on_top);
        assert!(config.root.focus_on_attach);
        assert!(config.synchronized_output);
    }

    #[test]
    fn builders() {
        let policy = ContainerPolicy {
            insert_new_on_top: false,
            focus_on_attach: false,
        };
        let config = CompositorConfig::default()
            .with_bounds(BoundsPolicy::Strict)
            .with_root_policy(policy);
        assert!(config.bounds.is_strict());
        assert_eq!(config.root, policy);
    }
}
