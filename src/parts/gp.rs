//! Geometric product parts: `group_i x group_j -> group_k`
//!
//! Each part function computes one output group of the geometric product
//! of two input groups. The parts compose into the whole geometric
//! product, the derived products (outer, contractions, scalar,
//! commutator), norms, and versor application.

use ecow::EcoString;
use enum_iterator::Sequence;
use serde::*;
use tracing::debug;

use crate::{
    dedup::CodeCache,
    emit::{self, Target},
    ir::*,
    metric::Metric,
    parts::{group_assignments, part_exists, CgData, PartFnKey},
    spec::{CodeStrategy, FloatType, Spec},
};

/// The products derivable from geometric product parts
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize,
)]
pub enum ProductKind {
    Geometric,
    Outer,
    LeftContraction,
    RightContraction,
    HestenesInner,
    ModifiedHestenesInner,
    Scalar,
    Commutator,
}

impl ProductKind {
    /// Short mnemonic used in generated function names
    pub fn mnemonic(&self) -> &'static str {
        match self {
            ProductKind::Geometric => "gp",
            ProductKind::Outer => "op",
            ProductKind::LeftContraction => "lc",
            ProductKind::RightContraction => "rc",
            ProductKind::HestenesInner => "hip",
            ProductKind::ModifiedHestenesInner => "mhip",
            ProductKind::Scalar => "sp",
            ProductKind::Commutator => "cp",
        }
    }
}

/// Whether the grade-`g3` part of the product of grades `g1` and `g2` is
/// provably zero by grade arithmetic alone. Never consults the symbolic
/// oracle, so `false` only means "not provably zero".
pub fn zero_by_grade(g1: u8, g2: u8, g3: u8, kind: ProductKind) -> bool {
    let (a, b, c) = (g1 as i32, g2 as i32, g3 as i32);
    match kind {
        ProductKind::Geometric => false,
        ProductKind::Outer => a + b != c,
        ProductKind::LeftContraction => !(a <= b && b - a == c),
        ProductKind::RightContraction => !(a >= b && a - b == c),
        ProductKind::HestenesInner => a == 0 || b == 0 || (a - b).abs() != c,
        ProductKind::ModifiedHestenesInner => (a - b).abs() != c,
        ProductKind::Scalar => !(c == 0 && a == b),
        ProductKind::Commutator => {
            // the grade a+b-2s part of AB picks up (-1)^((a-s)(b-s)) under
            // argument swap, so only odd (a-s)(b-s) survives in (AB-BA)/2
            for s in 0..=a.min(b) {
                let (f1, f2) = (a - s, b - s);
                if f1 + f2 == c && (f1 * f2) % 2 == 1 {
                    return false;
                }
            }
            true
        }
    }
}

/// Deterministic name of the partial geometric product function for
/// `group g1 x group g2 -> group g3`. A name is returned whether or not
/// the combination produces any code.
pub fn gp_part_name(ft: &FloatType, metric: &Metric, g1: usize, g2: usize, g3: usize) -> EcoString {
    format!("{}_{}_{g1}_{g2}_{g3}", ft.mangle("gp"), metric.name()).into()
}

/// The generic table-driven multiply routine for a float type
pub fn runtime_compute_gp_name(ft: &FloatType) -> EcoString {
    ft.mangle("runtime_compute_gp")
}

fn runtime_table_name(metric: &Metric, g1: usize, g2: usize, g3: usize) -> EcoString {
    format!("runtime_gp_table_{}_{g1}_{g2}_{g3}", metric.name()).into()
}

/// Writes the partial geometric product functions for every float type,
/// metric, and group triple, recording each triple's presence in
/// `cgd.gp_parts`.
pub fn write_gp_parts(spec: &Spec, target: Target, cgd: &mut CgData) {
    let layout = &spec.layout;
    let nb = layout.nb_groups();
    let expand = spec.strategy == CodeStrategy::Expand;

    // the two symbolic input multivectors, one value per group
    let (m1, m2): (Vec<_>, Vec<_>) = if expand {
        (
            (0..nb).map(|g| layout.symbolic_group(g, "A")).collect(),
            (0..nb).map(|g| layout.symbolic_group(g, "B")).collect(),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    for ft in &spec.float_types {
        for (metric_id, metric) in spec.metrics.iter().enumerate() {
            let mut cache = CodeCache::new();
            for g1 in 0..nb {
                for g2 in 0..nb {
                    let m3 = expand.then(|| {
                        let product = m1[g1].gp(&m2[g2], metric);
                        if metric.rounds() {
                            product.round(1e-14)
                        } else {
                            product
                        }
                    });
                    for g3 in 0..nb {
                        let name = gp_part_name(ft, metric, g1, g2, g3);
                        let body = if let Some(m3) = &m3 {
                            let assignments =
                                group_assignments(layout, "C", g3, m3, AssignOp::Add);
                            (!assignments.is_empty()).then_some(PartBody::Assign(assignments))
                        } else if !layout.zero_gp_by_grade(g1, g2, g3) {
                            Some(PartBody::TableCall(TableCall {
                                table: runtime_table_name(metric, g1, g2, g3),
                                compute_fn: runtime_compute_gp_name(ft),
                                init_fn: "init_runtime_gp_table".into(),
                                metric_id,
                                g1,
                                g2,
                                g3,
                            }))
                        } else {
                            None
                        };
                        cgd.gp_parts
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
                                "Computes the partial geometric product of two multivectors \
                                (group {g1} x group {g2} -> group {g3})"
                            ),
                            params: vec![
                                Param::In("A".into()),
                                Param::In("B".into()),
                                Param::Out("C".into()),
                            ],
                            body,
                        };
                        let (decl, def) = emit::render_part_fn(target, spec, ft, &part);
                        cgd.emit(decl, def);
                    }
                }
            }
        }
    }
    debug!(parts = cgd.gp_parts.len(), "wrote gp parts");
}

/// Whether the `g3` part of the `kind`-product of groups `g1` and `g2` is
/// zero for sure: either no code was generated for the underlying
/// geometric product part, or grade arithmetic rules it out for this
/// product kind. `write_gp_parts` must have completed first.
pub fn is_zero_part(
    spec: &Spec,
    cgd: &CgData,
    ft: &FloatType,
    metric: &Metric,
    g1: usize,
    g2: usize,
    g3: usize,
    kind: ProductKind,
) -> bool {
    let key = PartFnKey::new(ft, metric, gp_part_name(ft, metric, g1, g2, g3));
    if !part_exists(&cgd.gp_parts, &key) {
        return true;
    }
    let layout = &spec.layout;
    zero_by_grade(
        layout.group_grade(g1),
        layout.group_grade(g2),
        layout.group_grade(g3),
        kind,
    )
}

/// The body of a whole-multivector product of the given kind: expansion,
/// presence-guarded part calls, compression (or a direct scalar return
/// for the scalar product).
pub fn product_body(
    spec: &Spec,
    cgd: &CgData,
    target: Target,
    ft: &FloatType,
    metric: &Metric,
    kind: ProductKind,
    operands: [Operand; 2],
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let scalar_result = kind == ProductKind::Scalar;
    let mut steps = Vec::new();
    for g1 in 0..operands[0].nb_groups(layout) {
        if !operands[0].may_be_present(g1) {
            continue;
        }
        for g2 in 0..operands[1].nb_groups(layout) {
            if !operands[1].may_be_present(g2) {
                continue;
            }
            for g3 in 0..layout.nb_groups() {
                if is_zero_part(spec, cgd, ft, metric, g1, g2, g3, kind) {
                    continue;
                }
                let outer = (!operands[0].always_present(g1))
                    .then_some(Guard { operand: 0, group: g1 });
                let inner = (!operands[1].always_present(g2))
                    .then_some(Guard { operand: 1, group: g2 });
                steps.push(Step {
                    outer,
                    inner,
                    action: Action::Call(PartCall {
                        name: gp_part_name(ft, metric, g1, g2, g3),
                        om_operand: None,
                        args: vec![
                            GroupRef { operand: 0, group: g1 },
                            GroupRef { operand: 1, group: g2 },
                        ],
                        dst: if scalar_result {
                            Dst::Scalar
                        } else {
                            Dst::Group(g3)
                        },
                    }),
                });
            }
        }
    }
    let plan = CallPlan {
        operands: operands.to_vec(),
        scratch_coords: if scalar_result {
            1
        } else {
            layout.total_coords()
        },
        zero_scratch: true,
        norm_accumulator: false,
        steps,
        finish: if scalar_result {
            Finish::ReturnScalar
        } else {
            Finish::Compress(Usage::Dynamic)
        },
    };
    emit::render_plan(target, spec, ft, &plan, result_name)
}

/// Reversion sign over group scale, the multiplier folding a group's
/// self-product into the norm accumulator
fn norm_multiplier(spec: &Spec, group: usize) -> f64 {
    let blade = spec.layout.group(group)[0];
    blade.reverse().scale / blade.scale
}

/// The body of norm / norm squared.
///
/// With a diagonal metric only the `(g, g)` self-products can reach the
/// scalar group. Off-diagonal metric entries couple distinct basis
/// vectors, so the non-diagonal path also visits cross pairs of groups of
/// equal grade, reusing the outer guard across the inner loop.
pub fn norm_body(
    spec: &Spec,
    cgd: &CgData,
    target: Target,
    ft: &FloatType,
    metric: &Metric,
    squared: bool,
    operand: Operand,
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let nb = layout.nb_groups();
    let mut steps = Vec::new();
    if metric.is_diagonal() {
        for g in 0..nb {
            let key = PartFnKey::new(ft, metric, gp_part_name(ft, metric, g, g, 0));
            if !part_exists(&cgd.gp_parts, &key) {
                continue;
            }
            let outer = (!operand.always_present(g)).then_some(Guard { operand: 0, group: g });
            steps.push(Step {
                outer,
                inner: None,
                action: Action::ResetScalar,
            });
            steps.push(Step {
                outer,
                inner: None,
                action: Action::Call(PartCall {
                    name: gp_part_name(ft, metric, g, g, 0),
                    om_operand: None,
                    args: vec![
                        GroupRef { operand: 0, group: g },
                        GroupRef { operand: 0, group: g },
                    ],
                    dst: Dst::Scalar,
                }),
            });
            steps.push(Step {
                outer,
                inner: None,
                action: Action::AccumNorm {
                    mult: norm_multiplier(spec, g),
                },
            });
        }
    } else {
        for g1 in 0..nb {
            let outer = (!operand.always_present(g1)).then_some(Guard { operand: 0, group: g1 });
            let mut found = false;
            for g2 in 0..nb {
                let key = PartFnKey::new(ft, metric, gp_part_name(ft, metric, g1, g2, 0));
                if !part_exists(&cgd.gp_parts, &key) {
                    continue;
                }
                if !found {
                    steps.push(Step {
                        outer,
                        inner: None,
                        action: Action::ResetScalar,
                    });
                    found = true;
                }
                let inner = (g1 != g2 && !operand.always_present(g2))
                    .then_some(Guard { operand: 0, group: g2 });
                steps.push(Step {
                    outer,
                    inner,
                    action: Action::Call(PartCall {
                        name: gp_part_name(ft, metric, g1, g2, 0),
                        om_operand: None,
                        args: vec![
                            GroupRef { operand: 0, group: g1 },
                            GroupRef { operand: 0, group: g2 },
                        ],
                        dst: Dst::Scalar,
                    }),
                });
            }
            if found {
                steps.push(Step {
                    outer,
                    inner: None,
                    action: Action::AccumNorm {
                        mult: norm_multiplier(spec, g1),
                    },
                });
            }
        }
    }
    let plan = CallPlan {
        operands: vec![operand],
        scratch_coords: 1,
        zero_scratch: false,
        norm_accumulator: true,
        steps,
        finish: Finish::ReturnNorm {
            squared,
            positive_definite: metric.is_positive_definite(),
        },
    };
    emit::render_plan(target, spec, ft, &plan, result_name)
}

/// Bitmask of layout groups holding each grade
pub fn grade_group_masks(spec: &Spec) -> Vec<u32> {
    let layout = &spec.layout;
    let mut masks = vec![0u32; spec.dim as usize + 1];
    for g in 0..layout.nb_groups() {
        masks[layout.group_grade(g) as usize] |= 1 << g;
    }
    masks
}

/// The body of versor application `V M inverse(V)`. The final grade
/// projection onto the grades of `M` discards spurious grades introduced
/// by a non-unit or approximate versor.
pub fn versor_apply_body(
    spec: &Spec,
    target: Target,
    ft: &FloatType,
    metric: &Metric,
    inverse: VersorInverse,
    operands: Vec<Operand>,
    result_name: &str,
) -> String {
    let inverse_fn = match inverse {
        VersorInverse::Reverse => Some(ft.mangle("reverse")),
        VersorInverse::Inverse => {
            Some(format!("{}_{}", ft.mangle("versor_inverse"), metric.name()).into())
        }
        VersorInverse::Explicit => None,
    };
    let plan = VersorPlan {
        inverse,
        gp_fn: format!("{}_{}", ft.mangle("gp"), metric.name()).into(),
        inverse_fn,
        grade_fn: ft.mangle("extract_grade"),
        operands,
        grouped_by_grade: spec.layout.is_grouped_by_grade(),
        grade_masks: grade_group_masks(spec),
    };
    emit::render_versor(target, spec, ft, &plan, result_name)
}

#[cfg(test)]
mod test {
    use enum_iterator::all;

    use super::*;
    use crate::{
        symbolic::{Multivector, ScalarExpr},
    };

    /// A fully generic symbolic multivector of one grade
    fn generic(dims: u8, grade: u8, prefix: &str) -> Multivector {
        Multivector::from_blades((0..1u32 << dims).filter_map(|bitmap| {
            (bitmap.count_ones() as u8 == grade)
                .then(|| (bitmap, ScalarExpr::symbol(format!("{prefix}{bitmap}"))))
        }))
    }

    /// The kind-product of homogeneous inputs, computed from the oracle
    fn brute_force(
        kind: ProductKind,
        a: u8,
        b: u8,
        ab: &Multivector,
        ba: &Multivector,
        ma: &Multivector,
        mb: &Multivector,
    ) -> Multivector {
        match kind {
            ProductKind::Geometric => ab.clone(),
            ProductKind::Outer => ma.outer(mb),
            ProductKind::LeftContraction => {
                if a <= b {
                    ab.grade_part(b - a)
                } else {
                    Multivector::zero()
                }
            }
            ProductKind::RightContraction => {
                if a >= b {
                    ab.grade_part(a - b)
                } else {
                    Multivector::zero()
                }
            }
            ProductKind::HestenesInner => {
                if a == 0 || b == 0 {
                    Multivector::zero()
                } else {
                    ab.grade_part(a.abs_diff(b))
                }
            }
            ProductKind::ModifiedHestenesInner => ab.grade_part(a.abs_diff(b)),
            ProductKind::Scalar => ab.grade_part(0),
            ProductKind::Commutator => {
                ab.add(&ba.mul_scalar(&ScalarExpr::constant(-1.0)))
            }
        }
    }

    #[test]
    fn zero_classification_is_sound() {
        // every "provably zero" verdict is cross-checked against the
        // symbolic oracle on fully generic inputs
        const DIMS: u8 = 5;
        let metric = crate::metric::Metric::euclidean("e", DIMS);
        for a in 0..=DIMS {
            for b in 0..=DIMS {
                let ma = generic(DIMS, a, "a");
                let mb = generic(DIMS, b, "b");
                let ab = ma.gp(&mb, &metric);
                let ba = mb.gp(&ma, &metric);
                for kind in all::<ProductKind>() {
                    let product = brute_force(kind, a, b, &ab, &ba, &ma, &mb);
                    for c in 0..=DIMS {
                        if zero_by_grade(a, b, c, kind) {
                            assert!(
                                product.grade_part(c).is_zero(),
                                "classifier wrongly claims zero for \
                                {kind:?} {a} x {b} -> {c}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn commutator_classifier_is_symmetric() {
        for g1 in 0..=4 {
            for g2 in 0..=4 {
                for g3 in 0..=4 {
                    assert_eq!(
                        zero_by_grade(g1, g2, g3, ProductKind::Commutator),
                        zero_by_grade(g2, g1, g3, ProductKind::Commutator),
                    );
                }
            }
        }
    }

    #[test]
    fn outer_and_contraction_filters() {
        assert!(!zero_by_grade(1, 1, 2, ProductKind::Outer));
        assert!(zero_by_grade(1, 1, 0, ProductKind::Outer));
        assert!(!zero_by_grade(1, 2, 1, ProductKind::LeftContraction));
        assert!(zero_by_grade(2, 1, 1, ProductKind::LeftContraction));
        assert!(!zero_by_grade(2, 1, 1, ProductKind::RightContraction));
        assert!(zero_by_grade(0, 1, 1, ProductKind::HestenesInner));
        assert!(!zero_by_grade(0, 1, 1, ProductKind::ModifiedHestenesInner));
        assert!(!zero_by_grade(2, 2, 0, ProductKind::Scalar));
        assert!(zero_by_grade(2, 1, 0, ProductKind::Scalar));
    }

    fn euclid_2d() -> (Spec, CgData) {
        let spec = Spec::euclidean("t", 2);
        let mut cgd = CgData::default();
        write_gp_parts(&spec, Target::C, &mut cgd);
        (spec, cgd)
    }

    #[test]
    fn vector_products_route_to_the_right_groups() {
        let (spec, cgd) = euclid_2d();
        let ft = &spec.float_types[0];
        let metric = &spec.metrics[0];
        // e1 * e2 lands in the bivector group with coefficient 1
        assert!(cgd
            .def
            .contains("void double_gp_default_1_1_2(const double *A, const double *B, double *C)"));
        assert!(cgd.def.contains("C[0] += A[0]*B[1] - A[1]*B[0];"));
        // e1 * e1 lands in the scalar group with coefficient 1
        assert!(cgd.def.contains("C[0] += A[0]*B[0] + A[1]*B[1];"));
        // vector x vector never reaches the vector group
        let key = PartFnKey::new(ft, metric, gp_part_name(ft, metric, 1, 1, 1));
        assert_eq!(cgd.gp_parts.get(&key), Some(&false));
        // ..so the assembled product has no call into it
        let body = product_body(
            &spec,
            &cgd,
            Target::C,
            ft,
            metric,
            ProductKind::Geometric,
            [Operand::gmv("A"), Operand::gmv("B")],
            "R",
        );
        assert!(!body.contains("double_gp_default_1_1_1("));
        assert!(body.contains("double_gp_default_1_1_2(_A[1], _B[1], c + 3);"));
        assert!(body.contains("double_gp_default_1_1_0(_A[1], _B[1], c + 0);"));
    }

    #[test]
    fn identical_part_bodies_are_emitted_once() {
        let (spec, cgd) = euclid_2d();
        // scalar x scalar, scalar x bivector, bivector x scalar all reduce
        // to C[0] += A[0]*B[0]; only the first is a full definition
        let full = "void double_gp_default_0_0_0(const double *A, const double *B, double *C) {\n\
            \tC[0] += A[0]*B[0];\n}";
        assert!(cgd.def.contains(full));
        assert!(cgd
            .def
            .contains("void double_gp_default_0_2_2(const double *A, const double *B, double *C) {\n\
                \tdouble_gp_default_0_0_0(A, B, C);\n}"));
        assert!(cgd
            .def
            .contains("void double_gp_default_2_0_2(const double *A, const double *B, double *C) {\n\
                \tdouble_gp_default_0_0_0(A, B, C);\n}"));
        // exactly one single-assignment definition of that body remains
        assert_eq!(cgd.def.matches("\tC[0] += A[0]*B[0];\n}").count(), 1);
        let _ = spec;
    }

    #[test]
    fn specialized_operands_skip_their_guards() {
        let (spec, cgd) = euclid_2d();
        let ft = &spec.float_types[0];
        let metric = &spec.metrics[0];
        // operand A is compile-time typed with groups 0 and 2 present and
        // group 1 absent; B stays fully dynamic
        let body = product_body(
            &spec,
            &cgd,
            Target::C,
            ft,
            metric,
            ProductKind::Geometric,
            [Operand::specialized("A", 0b101), Operand::gmv("B")],
            "R",
        );
        assert!(!body.contains("A->gu & 1"));
        assert!(!body.contains("A->gu & 4"));
        assert!(!body.contains("A->gu & 2"));
        assert!(!body.contains("_A[1]"));
        assert!(body.contains("if (B->gu & 2) {"));
        // the same shape holds for the jagged-array targets
        let body = product_body(
            &spec,
            &cgd,
            Target::CSharp,
            ft,
            metric,
            ProductKind::Geometric,
            [Operand::specialized("A", 0b101), Operand::gmv("B")],
            "R",
        );
        assert!(!body.contains("ac[0] != null"));
        assert!(!body.contains("ac[2] != null"));
        assert!(body.contains("bc[1] != null"));
    }

    #[test]
    fn scalar_product_skips_compression() {
        let (spec, cgd) = euclid_2d();
        let ft = &spec.float_types[0];
        let metric = &spec.metrics[0];
        let body = product_body(
            &spec,
            &cgd,
            Target::C,
            ft,
            metric,
            ProductKind::Scalar,
            [Operand::gmv("A"), Operand::gmv("B")],
            "R",
        );
        assert!(body.starts_with("double c[1];"));
        assert!(body.trim_end().ends_with("return c[0];"));
        assert!(!body.contains("compress"));
        // only equal-grade pairs can reach the scalar
        assert!(body.contains("double_gp_default_1_1_0("));
        assert!(!body.contains("double_gp_default_1_2_0("));
    }

    #[test]
    fn norm_multipliers_cancel_reversion_signs() {
        // 3-D Euclidean: every unit blade has norm squared 1, because the
        // group multiplier is the same reversion sign that the self-product
        // part picked up
        let spec = Spec::euclidean("n", 3);
        let metric = &spec.metrics[0];
        for g in 0..spec.layout.nb_groups() {
            for blade in spec.layout.group(g) {
                let unit =
                    Multivector::from_blades([(blade.bitmap, ScalarExpr::constant(1.0))]);
                let self_product = unit.gp(&unit, metric).weight(0).as_constant().unwrap();
                let norm2 = norm_multiplier(&spec, g) * self_product;
                assert_eq!(norm2, 1.0, "norm2 of blade {:b}", blade.bitmap);
            }
        }
        // and the generated body folds those signs in
        let mut cgd = CgData::default();
        write_gp_parts(&spec, Target::C, &mut cgd);
        let ft = &spec.float_types[0];
        let body = norm_body(
            &spec,
            &cgd,
            Target::C,
            ft,
            metric,
            false,
            Operand::gmv("A"),
            "R",
        );
        assert!(body.contains("n2 += c[0];"));
        assert!(body.contains("n2 -= c[0];"));
        // positive-definite metric: no absolute-value branch
        assert!(body.contains("return sqrt(n2);"));
        let squared = norm_body(
            &spec,
            &cgd,
            Target::C,
            ft,
            metric,
            true,
            Operand::gmv("A"),
            "R",
        );
        assert!(squared.contains("return n2;"));
    }

    #[test]
    fn indefinite_norm_guards_the_square_root() {
        let mut spec = Spec::euclidean("m", 2);
        spec.metrics = vec![crate::metric::Metric::diagonal("mink", &[1.0, -1.0])];
        let mut cgd = CgData::default();
        write_gp_parts(&spec, Target::C, &mut cgd);
        let body = norm_body(
            &spec,
            &cgd,
            Target::C,
            &spec.float_types[0],
            &spec.metrics[0],
            false,
            Operand::gmv("A"),
            "R",
        );
        assert!(body.contains("(n2 < 0.0) ? sqrt(-n2) : sqrt(n2)"));
    }

    #[test]
    fn nondiagonal_norm_visits_cross_group_pairs() {
        let mut spec = Spec::euclidean("c", 2);
        spec.metrics =
            vec![crate::metric::Metric::from_matrix("cm", 2, vec![0.0, -1.0, -1.0, 0.0], true)
                .unwrap()];
        let mut cgd = CgData::default();
        write_gp_parts(&spec, Target::C, &mut cgd);
        let body = norm_body(
            &spec,
            &cgd,
            Target::C,
            &spec.float_types[0],
            &spec.metrics[0],
            true,
            Operand::gmv("A"),
            "R",
        );
        // the no/ni coupling makes the (1, 1) self-pair reach the scalar
        // through off-diagonal terms
        assert!(body.contains("double_gp_cm_1_1_0(_A[1], _A[1], c);"));
    }

    #[test]
    fn runtime_strategy_emits_table_calls() {
        let mut spec = Spec::euclidean("r", 2);
        spec.strategy = CodeStrategy::Runtime;
        let mut cgd = CgData::default();
        write_gp_parts(&spec, Target::C, &mut cgd);
        assert!(cgd
            .def
            .contains("double_runtime_compute_gp(A, B, C, &runtime_gp_table_default_1_1_2, 0, 1, 1, 2);"));
        // grade-filtered combinations are registered as empty
        let ft = &spec.float_types[0];
        let metric = &spec.metrics[0];
        let key = PartFnKey::new(ft, metric, gp_part_name(ft, metric, 0, 0, 2));
        assert_eq!(cgd.gp_parts.get(&key), Some(&false));
        // managed targets lazily initialize the table
        let mut cgd = CgData::default();
        write_gp_parts(&spec, Target::CSharp, &mut cgd);
        assert!(cgd
            .def
            .contains("if (runtime_gp_table_default_1_1_2 == null) \
                runtime_gp_table_default_1_1_2 = init_runtime_gp_table(0, 1, 1, 2);"));
    }

    #[test]
    fn versor_application_projects_onto_object_grades() {
        let spec = Spec::euclidean("v", 3);
        let ft = &spec.float_types[0];
        let metric = &spec.metrics[0];
        let body = versor_apply_body(
            &spec,
            Target::Cpp,
            ft,
            metric,
            VersorInverse::Reverse,
            vec![Operand::gmv("V"), Operand::gmv("M")],
            "R",
        );
        assert_eq!(
            body.trim_end(),
            "return double_extract_grade(double_gp_default(double_gp_default(V, M), \
            double_reverse(V)), M.gu());"
        );
        let c_body = versor_apply_body(
            &spec,
            Target::C,
            ft,
            metric,
            VersorInverse::Inverse,
            vec![Operand::gmv("V"), Operand::gmv("M")],
            "R",
        );
        assert!(c_body.contains("double_mv inv;"));
        assert!(c_body.contains("double_versor_inverse_default(&inv, V);"));
        assert!(c_body.contains("double_gp_default(&tmp, V, M);"));
        assert!(c_body.contains("double_gp_default(&tmp2, &tmp, &inv);"));
        assert!(c_body.contains("double_extract_grade(R, &tmp2, M->gu);"));
    }
}
