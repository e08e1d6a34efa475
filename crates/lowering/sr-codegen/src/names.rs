//! Collision-free register and storage names

use rustc_hash::FxHashMap;

/// Hands out `{base}{n}` names with one counter per base.
///
/// Counters are independent, so `tmp0` and `cell0` can coexist, and never
/// reset for the lifetime of the allocator.
#[derive(Debug, Default)]
pub struct NameAllocator {
    counters: FxHashMap<String, u32>,
}

impl NameAllocator {
    /// Creates an allocator with every counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Next name for `base`
    pub fn next(&mut self, base: &str) -> String {
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        let name = format!("{base}{counter}");
        *counter += 1;
        name
    }

    /// Storage cell for a variable, `_alloc_{name}{n}`
    pub fn cell(&mut self, variable: &str) -> String {
        self.next(&format!("_alloc_{variable}"))
    }

    /// Storage cell for a parameter, `_arg_{name}{n}`
    pub fn argument(&mut self, param: &str) -> String {
        self.next(&format!("_arg_{param}"))
    }

    /// Temporary produced by an operation, `_tmp_{op}{n}`
    pub fn temporary(&mut self, op: &str) -> String {
        self.next(&format!("_tmp_{op}"))
    }

    /// Value loaded from a variable, `_tmp_load_{name}{n}`
    pub fn load(&mut self, variable: &str) -> String {
        self.next(&format!("_tmp_load_{variable}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_per_base() {
        let mut names = NameAllocator::new();
        assert_eq!(names.next("tmp"), "tmp0");
        assert_eq!(names.next("tmp"), "tmp1");
        assert_eq!(names.next("str"), "str0");
        assert_eq!(names.next("tmp"), "tmp2");
    }

    #[test]
    fn test_prefixed_helpers() {
        let mut names = NameAllocator::new();
        assert_eq!(names.cell("x"), "_alloc_x0");
        assert_eq!(names.cell("x"), "_alloc_x1");
        assert_eq!(names.argument("a"), "_arg_a0");
        assert_eq!(names.temporary("add"), "_tmp_add0");
        assert_eq!(names.load("x"), "_tmp_load_x0");
    }
}
