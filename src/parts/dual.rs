//! Dual and undual parts: one function per (input group, output group)
//!
//! The dual of a group lands in the groups of grade `dim - grade`, so
//! only those pairs get a part function. Degenerate metrics have no
//! invertible pseudoscalar and are skipped with a collected error.

use ecow::EcoString;
use tracing::debug;

use crate::{
    dedup::CodeCache,
    emit::{self, Target},
    ir::*,
    metric::Metric,
    parts::{group_assignments, part_exists, CgData, PartFnKey},
    spec::{CodeStrategy, FloatType, Spec},
    symbolic::Multivector,
    GagenError,
};

pub fn dual_part_name(
    ft: &FloatType,
    metric: &Metric,
    dual: bool,
    gi: usize,
    go: usize,
) -> EcoString {
    let base = if dual { "dual" } else { "undual" };
    format!("{}_{}_{gi}_{go}", ft.mangle(base), metric.name()).into()
}

/// Writes the partial (un)dual functions for every float type, metric, and
/// group, recording each pair's presence in `cgd.dual_parts`.
pub fn write_dual_parts(spec: &Spec, target: Target, cgd: &mut CgData) {
    let layout = &spec.layout;
    let nb = layout.nb_groups();
    let expand = spec.strategy == CodeStrategy::Expand;
    let m1: Vec<Multivector> = (0..nb).map(|g| layout.symbolic_group(g, "A")).collect();
    // with a grouped-by-grade layout each output group receives exactly
    // one input group's dual; split-grade layouts must accumulate
    let op = if layout.is_grouped_by_grade() {
        AssignOp::Set
    } else {
        AssignOp::Add
    };

    for ft in &spec.float_types {
        for metric in &spec.metrics {
            if metric.is_degenerate() {
                if expand {
                    cgd.error(format!(
                        "Non-invertible pseudoscalar: no dual or undual functions \
                        generated for degenerate metric {}",
                        metric.name()
                    ));
                }
                continue;
            }
            let mut cache = CodeCache::new();
            for g1 in 0..nb {
                for dual in [true, false] {
                    let value = if expand {
                        let result = if dual {
                            m1[g1].dual(metric)
                        } else {
                            Ok(m1[g1].undual(metric))
                        };
                        match result {
                            Ok(v) => Some(if metric.rounds() { v.round(1e-14) } else { v }),
                            Err(GagenError::User(e)) => {
                                cgd.errors.push(e);
                                return;
                            }
                            Err(GagenError::Collected(errors)) => {
                                cgd.errors.extend(errors);
                                return;
                            }
                        }
                    } else {
                        None
                    };
                    let dual_grade = spec.dim - layout.group_grade(g1);
                    for g3 in 0..nb {
                        if layout.group_grade(g3) != dual_grade {
                            continue;
                        }
                        let name = dual_part_name(ft, metric, dual, g1, g3);
                        let body = match &value {
                            Some(value) => {
                                let assignments =
                                    group_assignments(layout, "C", g3, value, op);
                                (!assignments.is_empty()).then_some(PartBody::Assign(assignments))
                            }
                            None => runtime_dual_body(spec, ft, metric, dual, g1, g3),
                        };
                        cgd.dual_parts
                            .insert(PartFnKey::new(ft, metric, name.clone()), body.is_some());
                        let Some(mut body) = body else {
                            continue;
                        };
                        if expand {
                            if let Some(first) = cache.intern(&body, &name) {
                                body = PartBody::Forward { callee: first };
                            }
                        }
                        let part = PartFn {
                            name,
                            comment: format!(
                                "Computes the partial {} (w.r.t. full space) of a multivector",
                                if dual { "dual" } else { "undual" }
                            ),
                            params: vec![Param::In("A".into()), Param::Out("C".into())],
                            body,
                        };
                        let (decl, def) = emit::render_part_fn(target, spec, ft, &part);
                        cgd.emit(decl, def);
                    }
                }
            }
        }
    }
    debug!(parts = cgd.dual_parts.len(), "wrote dual parts");
}

/// Runtime-strategy (un)dual: a one-blade geometric product with the
/// (inverse) pseudoscalar, computed through the gp tables
fn runtime_dual_body(
    spec: &Spec,
    ft: &FloatType,
    metric: &Metric,
    dual: bool,
    g1: usize,
    g3: usize,
) -> Option<PartBody> {
    let i = Multivector::pseudoscalar(spec.dim);
    let full_bitmap = (1u32 << spec.dim) - 1;
    let i_scale = if dual {
        // versor inverse of the pseudoscalar
        let norm = i
            .gp(&i.reverse(), metric)
            .round(1e-12)
            .weight(0)
            .as_constant()?;
        crate::algebra::BasisBlade::unit(full_bitmap).reverse().scale / norm
    } else {
        1.0
    };
    let (g2, offset) = spec.layout.find(full_bitmap)?;
    let blade_scale = spec.layout.group(g2)[offset].scale;
    Some(PartBody::DualViaGp {
        factor: blade_scale * i_scale,
        gp_part: super::gp::gp_part_name(ft, metric, g1, g2, g3),
    })
}

/// The body of whole-multivector dualization: per-group dispatch through
/// the dual registry, then compression with the full usage bitmap.
pub fn dual_body(
    spec: &Spec,
    cgd: &CgData,
    target: Target,
    ft: &FloatType,
    metric: &Metric,
    dual: bool,
    operand: Operand,
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let nb = layout.nb_groups();
    let mut steps = Vec::new();
    for gi in 0..nb {
        if !operand.may_be_present(gi) {
            continue;
        }
        let outer = (!operand.always_present(gi)).then_some(Guard { operand: 0, group: gi });
        for go in 0..nb {
            let key = PartFnKey::new(ft, metric, dual_part_name(ft, metric, dual, gi, go));
            if !part_exists(&cgd.dual_parts, &key) {
                continue;
            }
            steps.push(Step {
                outer,
                inner: None,
                action: Action::Call(PartCall {
                    name: key.name,
                    om_operand: None,
                    args: vec![GroupRef { operand: 0, group: gi }],
                    dst: Dst::Group(go),
                }),
            });
        }
    }
    let plan = CallPlan {
        operands: vec![operand],
        scratch_coords: layout.total_coords(),
        zero_scratch: true,
        norm_accumulator: false,
        steps,
        finish: Finish::Compress(Usage::Dynamic),
    };
    emit::render_plan(target, spec, ft, &plan, result_name)
}

#[cfg(test)]
mod test {
    use super::*;

    fn euclid_3d() -> (Spec, CgData) {
        let spec = Spec::euclidean("d", 3);
        let mut cgd = CgData::default();
        write_dual_parts(&spec, Target::C, &mut cgd);
        (spec, cgd)
    }

    #[test]
    fn dual_parts_map_to_complementary_grades() {
        let (spec, cgd) = euclid_3d();
        let ft = &spec.float_types[0];
        let metric = &spec.metrics[0];
        // grade 1 -> grade 2 exists, grade 1 -> grade 1 was never attempted
        let key = PartFnKey::new(ft, metric, dual_part_name(ft, metric, true, 1, 2));
        assert_eq!(cgd.dual_parts.get(&key), Some(&true));
        let bad = PartFnKey::new(ft, metric, dual_part_name(ft, metric, true, 1, 1));
        assert!(!cgd.dual_parts.contains_key(&bad));
        // Euclidean dual of a vector: e1 -> -e2^e3, e2 -> e1^e3, e3 -> -e1^e2
        assert!(cgd.def.contains(
            "void double_dual_default_1_2(const double *A, double *C) {\n\
            \tC[0] = -A[2];\n\tC[1] = A[1];\n\tC[2] = -A[0];\n}"
        ));
    }

    #[test]
    fn identical_dual_and_undual_parts_share_code() {
        let (_, cgd) = euclid_3d();
        // dual of the trivector equals the undual of the scalar
        assert!(cgd.def.contains(
            "void double_dual_default_3_0(const double *A, double *C) {\n\
            \tdouble_undual_default_0_3(A, C);\n}"
        ));
    }

    #[test]
    fn degenerate_metric_is_reported_not_crashed() {
        let mut spec = Spec::euclidean("d", 2);
        spec.metrics = vec![Metric::diagonal("null", &[0.0, 1.0])];
        let mut cgd = CgData::default();
        write_dual_parts(&spec, Target::C, &mut cgd);
        assert_eq!(cgd.errors.len(), 1);
        assert!(cgd.dual_parts.is_empty());
        assert!(cgd.def.is_empty());
    }

    #[test]
    fn assembled_dual_guards_and_compresses() {
        let (spec, cgd) = euclid_3d();
        let ft = &spec.float_types[0];
        let metric = &spec.metrics[0];
        let body = dual_body(
            &spec,
            &cgd,
            Target::C,
            ft,
            metric,
            true,
            Operand::gmv("A"),
            "R",
        );
        assert!(body.contains("if (A->gu & 2) {"));
        assert!(body.contains("\tdouble_dual_default_1_2(_A[1], c + 4);"));
        assert!(body.contains("double_compress(c, R->c, &(R->gu), 0.0, 15);"));
    }

    #[test]
    fn runtime_dual_goes_through_the_gp_tables() {
        let mut spec = Spec::euclidean("d", 2);
        spec.strategy = CodeStrategy::Runtime;
        let mut cgd = CgData::default();
        write_dual_parts(&spec, Target::C, &mut cgd);
        // undual of group 0 multiplies by the pseudoscalar through the
        // (0, pseudo-group, target) gp part
        assert!(cgd.def.contains(
            "void double_undual_default_0_2(const double *A, double *C) {\n\
            \tdouble B[1] = {1.0};\n\tdouble_gp_default_0_2_2(A, B, C);\n}"
        ));
        // dual uses the inverted pseudoscalar's sign
        assert!(cgd.def.contains(
            "void double_dual_default_0_2(const double *A, double *C) {\n\
            \tdouble B[1] = {-1.0};\n\tdouble_gp_default_0_2_2(A, B, C);\n}"
        ));
    }
}
