/// A discovered profile waiting to be processed
///
/// Items are created when a profile is discovered through a flagged
/// comment's author or through a friend edge, consumed once by a worker,
/// and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrontierItem {
    /// Canonical 17-digit profile id
    pub node_id: String,

    /// Discovery lineage, seed first, ending with `node_id`
    pub path: Vec<String>,

    /// Distance from the seed
    pub depth: u32,
}

/// Separator used when a discovery path is stored as text
pub const PATH_SEPARATOR: &str = " -> ";

impl FrontierItem {
    /// Creates the root item for a crawl
    pub fn seed(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            path: vec![node_id.clone()],
            node_id,
            depth: 0,
        }
    }

    /// Creates an item discovered from this one
    pub fn child(&self, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend(self.path.iter().cloned());
        path.push(node_id.clone());

        Self {
            node_id,
            path,
            depth: self.depth + 1,
        }
    }

    /// Discovery path joined for storage, e.g. `a -> b -> c`
    pub fn path_string(&self) -> String {
        self.path.join(PATH_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed() {
        let seed = FrontierItem::seed("76561198000000001");
        assert_eq!(seed.depth, 0);
        assert_eq!(seed.path, vec!["76561198000000001".to_string()]);
    }

    #[test]
    fn test_child_extends_lineage() {
        let seed = FrontierItem::seed("a");
        let child = seed.child("b");
        let grandchild = child.child("c");

        assert_eq!(grandchild.node_id, "c");
        assert_eq!(grandchild.depth, 2);
        assert_eq!(grandchild.path_string(), "a -> b -> c");

        // parent is untouched
        assert_eq!(seed.path_string(), "a");
    }
}
