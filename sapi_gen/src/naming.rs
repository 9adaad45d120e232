//! Parameter naming.
//!
//! Declared names are used verbatim. Unnamed parameters get `unnamed<index>_`,
//! suffixed further if that spelling is already taken in the same list.

use sapi_types::ParamDecl;
use std::collections::HashSet;

/// Identifiers in use inside one generated function.
#[derive(Debug, Clone, Default)]
pub struct NameScope {
    taken: HashSet<String>,
}

impl NameScope {
    /* Seeds the scope with every declared name of the parameter list */
    pub fn for_params(params: &[ParamDecl]) -> Self {
        let taken = params
            .iter()
            .filter_map(|param| param.name.as_deref())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Self { taken }
    }

    pub fn name_for(&mut self, param: &ParamDecl, index: usize) -> String {
        if let Some(name) = param.name.as_deref().filter(|name| !name.is_empty()) {
            return name.to_string();
        }
        let base = format!("unnamed{}_", index);
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut suffix = 1usize;
        loop {
            let candidate = format!("unnamed{}_{}_", index, suffix);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /* Claims `base`, or the first free `base<n>` after it */
    pub fn reserve(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let mut suffix = 1usize;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/* Resolves every parameter name of one function, in order */
pub fn resolve_param_names(params: &[ParamDecl]) -> (Vec<String>, NameScope) {
    let mut scope = NameScope::for_params(params);
    let names = params
        .iter()
        .enumerate()
        .map(|(index, param)| scope.name_for(param, index))
        .collect();
    (names, scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapi_types::QualType;

    fn int() -> QualType {
        QualType::new("int")
    }

    #[test]
    fn unnamed_params_get_positional_names() {
        let params = vec![ParamDecl::unnamed(int()), ParamDecl::unnamed(int())];
        let (names, _) = resolve_param_names(&params);
        assert_eq!(names, ["unnamed0_", "unnamed1_"]);
    }

    #[test]
    fn declared_names_are_kept_verbatim() {
        let params = vec![
            ParamDecl::named("data", int()),
            ParamDecl::unnamed(int()),
            ParamDecl::named("length", int()),
        ];
        let (names, _) = resolve_param_names(&params);
        assert_eq!(names, ["data", "unnamed1_", "length"]);
    }

    #[test]
    fn synthesized_names_avoid_declared_ones() {
        /* the declared name comes later in the list and still wins */
        let params = vec![ParamDecl::unnamed(int()), ParamDecl::named("unnamed0_", int())];
        let (names, mut scope) = resolve_param_names(&params);
        assert_eq!(names, ["unnamed0_1_", "unnamed0_"]);
        assert_eq!(scope.reserve("unnamed0_1_"), "unnamed0_1_1");

        let params = vec![
            ParamDecl::named("unnamed0_", int()),
            ParamDecl::named("unnamed0_1_", int()),
            ParamDecl::unnamed(int()),
        ];
        let mut scope = NameScope::for_params(&params);
        assert_eq!(scope.name_for(&params[2], 0), "unnamed0_2_");
    }

    #[test]
    fn empty_names_count_as_missing() {
        let params = vec![ParamDecl::named("", int())];
        let (names, _) = resolve_param_names(&params);
        assert_eq!(names, ["unnamed0_"]);
    }

    #[test]
    fn names_are_stable_across_runs() {
        let params = vec![
            ParamDecl::unnamed(int()),
            ParamDecl::named("x", int()),
            ParamDecl::unnamed(int()),
        ];
        assert_eq!(resolve_param_names(&params).0, resolve_param_names(&params).0);
    }

    #[test]
    fn reserve_appends_counter_on_collision() {
        let params = vec![ParamDecl::named("ret_", int())];
        let mut scope = NameScope::for_params(&params);
        assert_eq!(scope.reserve("ret_"), "ret_1");
        assert_eq!(scope.reserve("ret_"), "ret_2");
        assert_eq!(scope.reserve("data_ptr"), "data_ptr");
    }
}
