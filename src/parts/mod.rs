//! Part-function generation: the decomposition of whole-multivector
//! operations into minimal per-group-combination subroutines
//!
//! Each submodule owns one family of parts. [`generate_parts_code`] runs
//! the four families concurrently and merges their output; nothing may
//! read a registry until that merge has happened, since call assembly
//! treats a missing registry entry as "this combination is zero".

pub mod casn;
pub mod dual;
pub mod gp;
pub mod om;

use std::mem::take;

use ecow::EcoString;
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    emit::Target,
    ir::{Assignment, AssignOp},
    metric::Metric,
    spec::{FloatType, MvLayout, Spec},
    symbolic::Multivector,
    UserError,
};

/// Identity of one generated part function: float type, metric name
/// (empty for metric-independent parts), synthesized function name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartFnKey {
    pub float: EcoString,
    pub metric: EcoString,
    pub name: EcoString,
}

impl PartFnKey {
    pub fn new(ft: &FloatType, metric: &Metric, name: impl Into<EcoString>) -> Self {
        Self {
            float: ft.name.clone(),
            metric: metric.name().clone(),
            name: name.into(),
        }
    }
    /// Key of a metric-independent part (outermorphism application)
    pub fn metric_free(ft: &FloatType, name: impl Into<EcoString>) -> Self {
        Self {
            float: ft.name.clone(),
            metric: EcoString::new(),
            name: name.into(),
        }
    }
}

/// Maps each part-function key to whether its body is non-empty. A missing
/// key means the part was never attempted; `false` means it was attempted
/// and found to contribute nothing.
pub type PartFnRegistry = IndexMap<PartFnKey, bool>;

pub fn part_exists(registry: &PartFnRegistry, key: &PartFnKey) -> bool {
    registry.get(key).copied().unwrap_or(false)
}

/// Output of one generation pass, and of the merged run
#[derive(Debug, Clone, Default)]
pub struct CgData {
    /// Declarations (prototypes), for targets that separate them
    pub decl: String,
    /// Definitions
    pub def: String,
    pub gp_parts: PartFnRegistry,
    pub dual_parts: PartFnRegistry,
    pub om_parts: PartFnRegistry,
    pub errors: Vec<UserError>,
}

impl CgData {
    pub fn emit(&mut self, decl: Option<String>, def: String) {
        if let Some(decl) = decl {
            self.decl.push_str(&decl);
        }
        self.def.push_str(&def);
    }
    pub fn error(&mut self, message: impl Into<EcoString>) {
        self.errors.push(UserError::new(message));
    }
}

/// Generates all parts code: geometric product, copy/add/sub/negate,
/// dual, and outermorphism application, in four concurrent passes.
///
/// The four passes are independent: each owns its output buffers and its
/// slice of the registries. The join below is a hard barrier; the merged
/// registries are complete before this function returns, which is what
/// makes later call assembly sound. Errors from all passes are collected,
/// so several independent specification problems surface in one run.
pub fn generate_parts_code(spec: &Spec, target: Target, decl_only: bool) -> CgData {
    let mut gp_data = CgData::default();
    let mut casn_data = CgData::default();
    let mut dual_data = CgData::default();
    let mut om_data = CgData::default();
    {
        let (a, b, c, d) = (
            &mut gp_data,
            &mut casn_data,
            &mut dual_data,
            &mut om_data,
        );
        rayon::scope(|s| {
            s.spawn(move |_| gp::write_gp_parts(spec, target, a));
            s.spawn(move |_| casn::write_casn_parts(spec, target, b));
            s.spawn(move |_| dual::write_dual_parts(spec, target, c));
            s.spawn(move |_| om::write_om_parts(spec, target, d));
        });
    }

    let mut merged = CgData::default();
    for data in [&gp_data, &casn_data, &dual_data, &om_data] {
        merged.decl.push_str(&data.decl);
    }
    if !decl_only {
        for data in [&gp_data, &casn_data, &dual_data, &om_data] {
            merged.def.push_str(&data.def);
        }
    }
    merged.gp_parts = take(&mut gp_data.gp_parts);
    merged.dual_parts = take(&mut dual_data.dual_parts);
    merged.om_parts = take(&mut om_data.om_parts);
    for data in [gp_data, casn_data, dual_data, om_data] {
        merged.errors.extend(data.errors);
    }
    debug!(
        gp = merged.gp_parts.len(),
        dual = merged.dual_parts.len(),
        om = merged.om_parts.len(),
        errors = merged.errors.len(),
        "generated parts code"
    );
    merged
}

/// The assignments writing a symbolic value into one group of a
/// multivector's coordinates. Zero coordinates are skipped; the caller
/// treats an empty list as "this combination contributes nothing".
pub(crate) fn group_assignments(
    layout: &MvLayout,
    dst: &str,
    group: usize,
    value: &Multivector,
    op: AssignOp,
) -> Vec<Assignment> {
    let mut assignments = Vec::new();
    for (i, blade) in layout.group(group).iter().enumerate() {
        let mut weight = value.weight(blade.bitmap);
        if weight.is_zero() {
            continue;
        }
        if blade.scale != 1.0 {
            weight = weight.scale(1.0 / blade.scale);
        }
        assignments.push(Assignment {
            dst: dst.into(),
            index: i,
            op,
            value: weight,
        });
    }
    assignments
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{metric::Metric, spec::GomSpec};

    #[test]
    fn four_passes_merge_in_fixed_order() {
        let mut spec = Spec::euclidean("merge", 2);
        spec.gom = Some(GomSpec::full("om", 2));
        let merged = generate_parts_code(&spec, Target::C, false);
        assert!(merged.errors.is_empty());
        assert!(!merged.gp_parts.is_empty());
        assert!(!merged.dual_parts.is_empty());
        assert!(!merged.om_parts.is_empty());
        // definitions concatenate in pass order: gp first, dual before om
        let gp_at = merged.def.find("double_gp_default_0_0_0").unwrap();
        let dual_at = merged.def.find("double_dual_default_").unwrap();
        let om_at = merged.def.find("double_apply_om_").unwrap();
        assert!(gp_at < dual_at && dual_at < om_at);
    }

    #[test]
    fn decl_only_omits_definitions() {
        let spec = Spec::euclidean("declonly", 2);
        let merged = generate_parts_code(&spec, Target::C, true);
        assert!(merged.def.is_empty());
        assert!(!merged.decl.is_empty());
        assert!(!merged.gp_parts.is_empty());
    }

    #[test]
    fn errors_from_one_pass_do_not_stop_the_others() {
        let mut spec = Spec::euclidean("degen", 2);
        spec.metrics = vec![Metric::diagonal("null", &[1.0, 0.0])];
        let merged = generate_parts_code(&spec, Target::C, false);
        // the dual pass reports the non-invertible pseudoscalar..
        assert_eq!(merged.errors.len(), 1);
        assert!(merged.errors[0].message.contains("pseudoscalar"));
        // ..while the gp pass still produced its parts
        assert!(!merged.gp_parts.is_empty());
        assert!(merged.dual_parts.is_empty());
    }

    #[test]
    fn every_target_renders() {
        let mut spec = Spec::euclidean("all", 2);
        spec.gom = Some(GomSpec::full("om", 2));
        for target in enum_iterator::all::<Target>() {
            let merged = generate_parts_code(&spec, target, false);
            assert!(merged.errors.is_empty(), "{target:?}");
            assert!(!merged.def.is_empty(), "{target:?}");
            // prototypes are only split out for the C family
            assert_eq!(merged.decl.is_empty(), !target.is_c_family());
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let mut spec = Spec::euclidean("det", 3);
        spec.gom = Some(GomSpec::full("om", 3));
        let first = generate_parts_code(&spec, Target::Cpp, false);
        let second = generate_parts_code(&spec, Target::Cpp, false);
        assert_eq!(first.def, second.def);
        assert_eq!(first.decl, second.decl);
        let keys1: Vec<_> = first.gp_parts.keys().collect();
        let keys2: Vec<_> = second.gp_parts.keys().collect();
        assert_eq!(keys1, keys2);
    }
}
