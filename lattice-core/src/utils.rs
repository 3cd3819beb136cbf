//! Utility functions for the container
//!
//! Naming, simple pattern matching and dependency bookkeeping shared by the
//! registry, the injection engine and the proxy creators.

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a type name to the default bean name.
    ///
    /// `UserService` becomes `userService`. Names starting with two upper-case
    /// characters are kept as they are, so `URLResolver` stays `URLResolver`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lattice_core::utils::naming::to_camel_case;
    ///
    /// assert_eq!(to_camel_case("UserService"), "userService");
    /// assert_eq!(to_camel_case("URLResolver"), "URLResolver");
    /// assert_eq!(to_camel_case(""), "");
    /// ```
    pub fn to_camel_case(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                if first.is_uppercase() && chars.clone().next().is_some_and(char::is_uppercase) {
                    return s.to_string();
                }
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(chars.as_str());
                result
            }
        }
    }

    /// Last segment of a `a::b::Type` path.
    pub fn simple_name(class_name: &str) -> &str {
        class_name.rsplit("::").next().unwrap_or(class_name)
    }

    /// Everything before the last `::`, empty for top-level names.
    pub fn package_name(class_name: &str) -> &str {
        class_name.rsplit_once("::").map(|(pkg, _)| pkg).unwrap_or("")
    }
}

/// Wildcard matching used for bean-name patterns and pointcut type patterns
pub mod pattern {
    /// Matches `text` against a pattern supporting `*` wildcards.
    ///
    /// Supports `xxx*`, `*xxx`, `*xxx*`, `xxx*yyy` and exact matches.
    ///
    /// # Examples
    ///
    /// ```
    /// use lattice_core::utils::pattern::simple_match;
    ///
    /// assert!(simple_match("userService*", "userServiceImpl"));
    /// assert!(!simple_match("userService*", "impluserService"));
    /// assert!(simple_match("*Dao", "orderDao"));
    /// assert!(simple_match("user*Impl", "userServiceImpl"));
    /// ```
    pub fn simple_match(pattern: &str, text: &str) -> bool {
        let Some(first) = pattern.find('*') else {
            return pattern == text;
        };

        if first == 0 {
            if pattern.len() == 1 {
                return true;
            }
            let rest = &pattern[1..];
            let Some(next) = rest.find('*') else {
                return text.ends_with(rest);
            };
            if next == 0 {
                return simple_match(rest, text);
            }
            let part = &rest[..next];
            let remainder = &rest[next..];
            let mut start = 0;
            while let Some(offset) = text[start..].find(part) {
                let index = start + offset;
                if simple_match(remainder, &text[index + part.len()..]) {
                    return true;
                }
                start = index + text[index..].chars().next().map_or(1, char::len_utf8);
            }
            return false;
        }

        text.len() >= first
            && text.is_char_boundary(first)
            && pattern[..first] == text[..first]
            && simple_match(&pattern[first..], &text[first..])
    }

    /// Matches if any of the patterns matches.
    pub fn simple_match_any<S: AsRef<str>>(patterns: &[S], text: &str) -> bool {
        patterns.iter().any(|p| simple_match(p.as_ref(), text))
    }
}

/// Dependency bookkeeping utilities
pub mod dependency {
    use parking_lot::RwLock;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TRACKER_ID: AtomicUsize = AtomicUsize::new(1);

    thread_local! {
        static IN_CREATION: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
    }

    /// Tracks beans currently being created on the calling thread.
    ///
    /// Every bean-creation call stack has its own slot, so two threads creating
    /// the same prototype concurrently never see each other.
    #[derive(Debug)]
    pub struct CreationTracker {
        id: usize,
    }

    impl Default for CreationTracker {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CreationTracker {
        /// Creates a new tracker with its own identity.
        pub fn new() -> Self {
            Self {
                id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
            }
        }

        /// Checks if a bean is currently being created on this thread.
        pub fn is_creating(&self, name: &str) -> bool {
            IN_CREATION.with(|stack| {
                stack
                    .borrow()
                    .iter()
                    .any(|(id, n)| *id == self.id && n == name)
            })
        }

        /// Beans currently being created on this thread, outermost first.
        pub fn current_creating(&self) -> Vec<String> {
            IN_CREATION.with(|stack| {
                stack
                    .borrow()
                    .iter()
                    .filter(|(id, _)| *id == self.id)
                    .map(|(_, n)| n.clone())
                    .collect()
            })
        }

        /// Marks a bean as being created.
        ///
        /// Returns the creation chain ending in `name` when it is already being
        /// created, which means a circular reference.
        pub fn start_creating(&self, name: &str) -> Result<CreationGuard<'_>, Vec<String>> {
            if self.is_creating(name) {
                let mut chain = self.current_creating();
                chain.push(name.to_string());
                return Err(chain);
            }
            IN_CREATION.with(|stack| stack.borrow_mut().push((self.id, name.to_string())));
            Ok(CreationGuard {
                tracker: self,
                name: name.to_string(),
            })
        }

        fn finish_creating(&self, name: &str) -> bool {
            IN_CREATION.with(|stack| {
                let mut stack = stack.borrow_mut();
                match stack.iter().rposition(|(id, n)| *id == self.id && n == name) {
                    Some(index) => {
                        stack.remove(index);
                        true
                    }
                    None => false,
                }
            })
        }
    }

    /// Clears the creation mark when dropped, on success and on error paths alike.
    pub struct CreationGuard<'a> {
        tracker: &'a CreationTracker,
        name: String,
    }

    impl Drop for CreationGuard<'_> {
        fn drop(&mut self) {
            if !self.tracker.finish_creating(&self.name) {
                tracing::error!("Failed to clear creation mark for bean '{}'", self.name);
            }
        }
    }

    /// Records which beans depend on which, for shutdown ordering.
    #[derive(Debug, Default)]
    pub struct DependentBeanRegistry {
        /// bean -> beans that depend on it
        dependents: RwLock<HashMap<String, Vec<String>>>,
        /// bean -> beans it depends on
        dependencies: RwLock<HashMap<String, Vec<String>>>,
    }

    impl DependentBeanRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        /// Records that `dependent` depends on `bean`. Idempotent.
        pub fn register_dependent(&self, bean: &str, dependent: &str) {
            {
                let mut dependents = self.dependents.write();
                let entry = dependents.entry(bean.to_string()).or_default();
                if entry.iter().any(|d| d == dependent) {
                    return;
                }
                entry.push(dependent.to_string());
            }
            self.dependencies
                .write()
                .entry(dependent.to_string())
                .or_default()
                .push(bean.to_string());
        }

        /// Beans that depend on `bean`.
        pub fn dependents_of(&self, bean: &str) -> Vec<String> {
            self.dependents.read().get(bean).cloned().unwrap_or_default()
        }

        /// Beans that `bean` depends on.
        pub fn dependencies_of(&self, bean: &str) -> Vec<String> {
            self.dependencies.read().get(bean).cloned().unwrap_or_default()
        }

        /// Whether `dependent` depends on `bean`, directly or transitively.
        pub fn is_dependent(&self, bean: &str, dependent: &str) -> bool {
            let dependents = self.dependents.read();
            let mut visited = HashSet::new();
            let mut pending = vec![bean.to_string()];
            while let Some(current) = pending.pop() {
                if !visited.insert(current.clone()) {
                    continue;
                }
                if let Some(direct) = dependents.get(&current) {
                    if direct.iter().any(|d| d == dependent) {
                        return true;
                    }
                    pending.extend(direct.iter().cloned());
                }
            }
            false
        }

        /// Forgets every edge touching `bean`.
        pub fn remove(&self, bean: &str) {
            let mut dependents = self.dependents.write();
            let mut dependencies = self.dependencies.write();
            dependents.remove(bean);
            dependencies.remove(bean);
            for list in dependents.values_mut() {
                list.retain(|d| d != bean);
            }
            for list in dependencies.values_mut() {
                list.retain(|d| d != bean);
            }
        }

        pub fn clear(&self) {
            self.dependents.write().clear();
            self.dependencies.write().clear();
        }
    }

    /// Dependency graph analysis result
    #[derive(Debug)]
    pub enum DependencyValidationError {
        /// Circular dependency detected
        CircularDependency {
            /// The dependency chain forming the cycle
            cycle: Vec<String>,
        },
        /// Missing dependency detected
        MissingDependency {
            /// The bean that requires the dependency
            bean: String,
            /// The missing dependency
            missing: String,
        },
    }

    impl std::fmt::Display for DependencyValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::CircularDependency { cycle } => {
                    write!(f, "Circular depends-on relationship: {}", cycle.join(" -> "))
                }
                Self::MissingDependency { bean, missing } => {
                    write!(f, "Bean '{}' depends on '{}' which is not registered", bean, missing)
                }
            }
        }
    }

    /// Validates the declared depends-on graph.
    ///
    /// `is_registered` answers whether a name (or alias) is known to the registry.
    pub fn validate_dependency_graph(
        dependencies: &HashMap<String, Vec<String>>,
        is_registered: impl Fn(&str) -> bool,
    ) -> Result<(), DependencyValidationError> {
        let mut names: Vec<&String> = dependencies.keys().collect();
        names.sort();

        for bean_name in &names {
            for dep in &dependencies[*bean_name] {
                if !is_registered(dep) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: (*bean_name).clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = Vec::new();
        for bean_name in names {
            if !visited.contains(bean_name) {
                if let Some(cycle) = detect_cycle_dfs(bean_name, dependencies, &mut visited, &mut rec_stack) {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    fn detect_cycle_dfs(
        node: &str,
        graph: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.push(node.to_string());

        if let Some(deps) = graph.get(node) {
            for dep in deps {
                if let Some(start) = rec_stack.iter().position(|x| x == dep) {
                    let mut cycle = rec_stack[start..].to_vec();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, rec_stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    mod naming_tests {
        use super::super::naming::*;

        #[test]
        fn test_to_camel_case() {
            assert_eq!(to_camel_case("UserService"), "userService");
            assert_eq!(to_camel_case("A"), "a");
            assert_eq!(to_camel_case("URLResolver"), "URLResolver");
            assert_eq!(to_camel_case("lowerCase"), "lowerCase");
        }

        #[test]
        fn test_simple_and_package_names() {
            assert_eq!(simple_name("app::service::UserService"), "UserService");
            assert_eq!(package_name("app::service::UserService"), "app::service");
            assert_eq!(package_name("UserService"), "");
        }
    }

    mod pattern_tests {
        use super::super::pattern::*;

        #[test]
        fn test_prefix_suffix_and_combined() {
            assert!(simple_match("userService*", "userServiceImpl"));
            assert!(!simple_match("userService*", "impluserService"));
            assert!(simple_match("*Service", "orderService"));
            assert!(simple_match("*rder*", "orderService"));
            assert!(simple_match("order*Impl", "orderServiceImpl"));
            assert!(!simple_match("order*Impl", "orderService"));
            assert!(simple_match("userService", "userService"));
            assert!(simple_match("*", "anything"));
        }

        #[test]
        fn test_match_any() {
            assert!(simple_match_any(&["a*", "*b"], "xxb"));
            assert!(!simple_match_any::<&str>(&[], "xxb"));
        }
    }

    mod dependency_tests {
        use super::super::dependency::*;
        use std::collections::HashMap;

        #[test]
        fn test_creation_tracker_reports_chain() {
            let tracker = CreationTracker::new();

            let _a = tracker.start_creating("serviceA").unwrap();
            let _b = tracker.start_creating("serviceB").unwrap();
            let chain = match tracker.start_creating("serviceA") {
                Err(chain) => chain,
                Ok(_) => panic!("Expected circular reference"),
            };
            assert_eq!(chain, vec!["serviceA", "serviceB", "serviceA"]);
        }

        #[test]
        fn test_creation_guard_clears_mark() {
            let tracker = CreationTracker::new();
            {
                let _guard = tracker.start_creating("serviceA").unwrap();
                assert!(tracker.is_creating("serviceA"));
            }
            assert!(!tracker.is_creating("serviceA"));
        }

        #[test]
        fn test_creation_tracker_is_per_thread() {
            let tracker = std::sync::Arc::new(CreationTracker::new());
            let _guard = tracker.start_creating("proto").unwrap();

            let other = std::sync::Arc::clone(&tracker);
            let handle = std::thread::spawn(move || other.is_creating("proto"));
            assert!(!handle.join().unwrap());
        }

        #[test]
        fn test_dependent_registry_transitive() {
            let registry = DependentBeanRegistry::new();
            registry.register_dependent("dataSource", "repository");
            registry.register_dependent("repository", "service");
            registry.register_dependent("repository", "service");

            assert_eq!(registry.dependents_of("repository"), vec!["service"]);
            assert_eq!(registry.dependencies_of("service"), vec!["repository"]);
            assert!(registry.is_dependent("dataSource", "service"));
            assert!(!registry.is_dependent("service", "dataSource"));
        }

        #[test]
        fn test_validate_missing_dependency() {
            let mut deps = HashMap::new();
            deps.insert("serviceA".to_string(), vec!["serviceB".to_string()]);

            let result = validate_dependency_graph(&deps, |name| name == "serviceA");
            if let Err(DependencyValidationError::MissingDependency { bean, missing }) = result {
                assert_eq!(bean, "serviceA");
                assert_eq!(missing, "serviceB");
            } else {
                panic!("Expected MissingDependency error");
            }
        }

        #[test]
        fn test_validate_circular_dependency() {
            let mut deps = HashMap::new();
            deps.insert("serviceA".to_string(), vec!["serviceB".to_string()]);
            deps.insert("serviceB".to_string(), vec!["serviceC".to_string()]);
            deps.insert("serviceC".to_string(), vec!["serviceA".to_string()]);

            let result = validate_dependency_graph(&deps, |_| true);
            if let Err(DependencyValidationError::CircularDependency { cycle }) = result {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            } else {
                panic!("Expected CircularDependency error");
            }
        }

        #[test]
        fn test_validate_valid_graph() {
            let mut deps = HashMap::new();
            deps.insert("database".to_string(), vec!["config".to_string()]);
            deps.insert("userService".to_string(), vec!["database".to_string(), "config".to_string()]);

            assert!(validate_dependency_graph(&deps, |_| true).is_ok());
        }
    }
}
