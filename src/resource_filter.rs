/// Request categories the filter distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Other,
}

/// Which requests a session lets through.
///
/// Stylesheets and scripts always pass: visibility checks and label
/// associations on the portal depend on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFilter {
    blocked: Vec<ResourceKind>,
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self {
            blocked: vec![ResourceKind::Image, ResourceKind::Font],
        }
    }
}

impl ResourceFilter {
    pub fn allows(&self, kind: ResourceKind) -> bool {
        !self.blocked.contains(&kind)
    }

    pub fn blocked(&self) -> &[ResourceKind] {
        &self.blocked
    }
}
