//! Copy, add, subtract, and sign-toggle parts, plus the comparison and
//! grade-selection code built from them
//!
//! These parts are metric-independent and every group maps to itself, so
//! this pass contributes no registry: presence at a call site is decided
//! by the operand usage bitmaps alone.

use std::fmt::Write;

use ecow::EcoString;
use tracing::debug;

use crate::{
    algebra::BasisBlade,
    dedup::CodeCache,
    emit::{self, Target},
    ir::*,
    parts::CgData,
    spec::{FloatType, Spec},
    symbolic::ScalarExpr,
};

/// The unary operations that only toggle signs of whole groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleSign {
    Negate,
    Reverse,
    GradeInvolution,
    CliffordConjugate,
}

impl ToggleSign {
    /// The sign this operation applies to a blade's group
    fn sign(self, blade: BasisBlade) -> f64 {
        let blade = BasisBlade::unit(blade.bitmap);
        match self {
            ToggleSign::Negate => -1.0,
            ToggleSign::Reverse => blade.reverse().scale,
            ToggleSign::GradeInvolution => blade.grade_involution().scale,
            ToggleSign::CliffordConjugate => blade.clifford_conjugate().scale,
        }
    }
}

pub fn copy_part_name(ft: &FloatType, g: usize) -> EcoString {
    ft.mangle(&format!("copy_group_{g}"))
}
pub fn copy_mul_part_name(ft: &FloatType, g: usize) -> EcoString {
    ft.mangle(&format!("copy_mul_group_{g}"))
}
pub fn neg_part_name(ft: &FloatType, g: usize) -> EcoString {
    ft.mangle(&format!("neg_group_{g}"))
}
pub fn add_part_name(ft: &FloatType, g: usize) -> EcoString {
    ft.mangle(&format!("add_group_{g}"))
}
pub fn sub_part_name(ft: &FloatType, g: usize) -> EcoString {
    ft.mangle(&format!("sub_group_{g}"))
}

/// Writes the per-group copy, copy-multiply, negate, add, and subtract
/// functions. Groups of equal size produce identical bodies, which the
/// deduplicator folds into one definition each.
pub fn write_casn_parts(spec: &Spec, target: Target, cgd: &mut CgData) {
    let layout = &spec.layout;
    for ft in &spec.float_types {
        let mut cache = CodeCache::new();
        let mut emit_part =
            |cgd: &mut CgData, name: EcoString, comment: String, params: Vec<Param>, body| {
                let mut body = PartBody::Assign(body);
                if let Some(first) = cache.intern(&body, &name) {
                    body = PartBody::Forward { callee: first };
                }
                let part = PartFn {
                    name,
                    comment,
                    params,
                    body,
                };
                let (decl, def) = emit::render_part_fn(target, spec, ft, &part);
                cgd.emit(decl, def);
            };
        for g in 0..layout.nb_groups() {
            let len = layout.group(g).len();
            let unary = |value: fn(ScalarExpr) -> ScalarExpr| -> Vec<Assignment> {
                (0..len)
                    .map(|i| Assignment {
                        dst: "C".into(),
                        index: i,
                        op: AssignOp::Set,
                        value: value(ScalarExpr::symbol(format!("A[{i}]"))),
                    })
                    .collect()
            };
            let binary = |sign: f64| -> Vec<Assignment> {
                (0..len)
                    .map(|i| Assignment {
                        dst: "C".into(),
                        index: i,
                        op: AssignOp::Set,
                        value: ScalarExpr::symbol(format!("A[{i}]"))
                            .add(&ScalarExpr::symbol(format!("B[{i}]")).scale(sign)),
                    })
                    .collect()
            };
            let unary_params = || vec![Param::In("A".into()), Param::Out("C".into())];
            let binary_params = || {
                vec![
                    Param::In("A".into()),
                    Param::In("B".into()),
                    Param::Out("C".into()),
                ]
            };
            emit_part(
                cgd,
                copy_part_name(ft, g),
                format!("Copies group {g} of a multivector"),
                unary_params(),
                unary(|v| v),
            );
            emit_part(
                cgd,
                copy_mul_part_name(ft, g),
                format!("Copies group {g} of a multivector, multiplied by a scalar"),
                vec![
                    Param::In("A".into()),
                    Param::Val("s".into()),
                    Param::Out("C".into()),
                ],
                unary(|v| v.mul(&ScalarExpr::symbol("s"))),
            );
            emit_part(
                cgd,
                neg_part_name(ft, g),
                format!("Negates group {g} of a multivector"),
                unary_params(),
                unary(|v| v.neg()),
            );
            emit_part(
                cgd,
                add_part_name(ft, g),
                format!("Adds group {g} of two multivectors"),
                binary_params(),
                binary(1.0),
            );
            emit_part(
                cgd,
                sub_part_name(ft, g),
                format!("Subtracts group {g} of two multivectors"),
                binary_params(),
                binary(-1.0),
            );
        }
    }
    debug!("wrote copy/add/sub/neg parts");
}

/// The body of a sign-toggling unary operation (negate, reverse, grade
/// involution, Clifford conjugate): per group either a plain copy or a
/// negated copy, decided by the group's grade.
pub fn toggle_sign_body(
    spec: &Spec,
    target: Target,
    ft: &FloatType,
    toggle: ToggleSign,
    operand: Operand,
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let mut steps = Vec::new();
    for g in 0..layout.nb_groups() {
        if !operand.may_be_present(g) {
            continue;
        }
        let sign = toggle.sign(layout.group(g)[0]);
        let name = if sign < 0.0 {
            neg_part_name(ft, g)
        } else {
            copy_part_name(ft, g)
        };
        steps.push(Step {
            outer: (!operand.always_present(g)).then_some(Guard { operand: 0, group: g }),
            inner: None,
            action: Action::Call(PartCall {
                name,
                om_operand: None,
                args: vec![GroupRef { operand: 0, group: g }],
                dst: Dst::Group(g),
            }),
        });
    }
    let plan = CallPlan {
        operands: vec![operand],
        scratch_coords: layout.total_coords(),
        zero_scratch: false,
        norm_accumulator: false,
        steps,
        // every group maps to itself, so the result uses exactly the
        // source's groups
        finish: Finish::Compress(Usage::OfOperand(0)),
    };
    emit::render_plan(target, spec, ft, &plan, result_name)
}

/// The body of multiplication by a scalar: per present group, one
/// copy-multiply part call into the scratch.
pub fn scale_body(
    spec: &Spec,
    target: Target,
    ft: &FloatType,
    operand: Operand,
    scalar_arg: &str,
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let plan = CallPlan {
        operands: vec![operand],
        scratch_coords: layout.total_coords(),
        zero_scratch: false,
        norm_accumulator: false,
        steps: Vec::new(),
        finish: Finish::Compress(Usage::OfOperand(0)),
    };
    let mut s = emit::expand_str(target, spec, ft, &plan);
    for g in 0..layout.nb_groups() {
        if !plan.operands[0].may_be_present(g) {
            continue;
        }
        let a_ref = emit::group_ref_str(target, &plan.operands, GroupRef { operand: 0, group: g });
        let (prelude, dst) = emit::dst_str(target, spec, ft, Dst::Group(g));
        let guarded = !plan.operands[0].always_present(g);
        let tab = if guarded { "\t" } else { "" };
        if guarded {
            let pa = emit::presence_expr(target, &plan.operands, Guard { operand: 0, group: g });
            _ = writeln!(s, "if ({pa}) {{");
        }
        if let Some(prelude) = prelude {
            _ = writeln!(s, "{tab}{prelude}");
        }
        _ = writeln!(
            s,
            "{tab}{}({a_ref}, {scalar_arg}, {dst});",
            copy_mul_part_name(ft, g)
        );
        if guarded {
            _ = writeln!(s, "}}");
        }
    }
    s.push_str(&emit::finish_str(target, spec, ft, &plan, result_name));
    s
}

/// The body of addition or subtraction: per group, dispatch on which of
/// the two operands actually holds the group.
pub fn add_sub_body(
    spec: &Spec,
    target: Target,
    ft: &FloatType,
    subtract: bool,
    operands: [Operand; 2],
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let plan = CallPlan {
        operands: operands.to_vec(),
        scratch_coords: layout.total_coords(),
        zero_scratch: true,
        norm_accumulator: false,
        steps: Vec::new(),
        finish: Finish::Compress(Usage::Dynamic),
    };
    let mut s = emit::expand_str(target, spec, ft, &plan);
    for g in 0..layout.nb_groups() {
        let pa = emit::presence_expr(target, &plan.operands, Guard { operand: 0, group: g });
        let pb = emit::presence_expr(target, &plan.operands, Guard { operand: 1, group: g });
        let a_ref = emit::group_ref_str(target, &plan.operands, GroupRef { operand: 0, group: g });
        let b_ref = emit::group_ref_str(target, &plan.operands, GroupRef { operand: 1, group: g });
        let (prelude, dst) = emit::dst_str(target, spec, ft, Dst::Group(g));
        let prelude = prelude.map(|p| format!("\t{p}\n")).unwrap_or_default();
        let both = if subtract {
            sub_part_name(ft, g)
        } else {
            add_part_name(ft, g)
        };
        let b_only = if subtract {
            neg_part_name(ft, g)
        } else {
            copy_part_name(ft, g)
        };
        _ = writeln!(s, "if (({pa}) && ({pb})) {{");
        _ = write!(s, "{prelude}\t{both}({a_ref}, {b_ref}, {dst});\n");
        _ = writeln!(s, "}} else if ({pa}) {{");
        _ = write!(s, "{prelude}\t{}({a_ref}, {dst});\n", copy_part_name(ft, g));
        _ = writeln!(s, "}} else if ({pb}) {{");
        _ = write!(s, "{prelude}\t{b_only}({b_ref}, {dst});\n");
        _ = writeln!(s, "}}");
    }
    s.push_str(&emit::finish_str(target, spec, ft, &plan, result_name));
    s
}

/// The body of grade-part extraction: copies the groups selected by the
/// runtime `group_bitmap` argument.
pub fn grade_extract_body(
    spec: &Spec,
    target: Target,
    ft: &FloatType,
    operand: Operand,
    bitmap_arg: &str,
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let plan = CallPlan {
        operands: vec![operand],
        scratch_coords: layout.total_coords(),
        zero_scratch: true,
        norm_accumulator: false,
        steps: Vec::new(),
        finish: Finish::Compress(Usage::Dynamic),
    };
    let mut s = emit::expand_str(target, spec, ft, &plan);
    for g in 0..layout.nb_groups() {
        if !plan.operands[0].may_be_present(g) {
            continue;
        }
        let select = format!("{bitmap_arg} & {}", 1u32 << g);
        let cond = if plan.operands[0].always_present(g) {
            select
        } else {
            let pa = emit::presence_expr(target, &plan.operands, Guard { operand: 0, group: g });
            format!("({select}) && ({pa})")
        };
        let a_ref = emit::group_ref_str(target, &plan.operands, GroupRef { operand: 0, group: g });
        let (prelude, dst) = emit::dst_str(target, spec, ft, Dst::Group(g));
        _ = writeln!(s, "if ({cond}) {{");
        if let Some(prelude) = prelude {
            _ = writeln!(s, "\t{prelude}");
        }
        _ = writeln!(s, "\t{}({a_ref}, {dst});", copy_part_name(ft, g));
        _ = writeln!(s, "}}");
    }
    s.push_str(&emit::finish_str(target, spec, ft, &plan, result_name));
    s
}

/// The body of an equality test with tolerance `eps_name`
pub fn equals_body(
    spec: &Spec,
    target: Target,
    ft: &FloatType,
    operands: [Operand; 2],
    eps_name: &str,
) -> String {
    let layout = &spec.layout;
    let operands = operands.to_vec();
    let abs = emit::abs_call(target, ft);
    let no = emit::bool_lit(target, false);
    let mut s = emit::expand_operands_str(target, spec, ft, &operands);
    for g in 0..layout.nb_groups() {
        let pa = emit::presence_expr(target, &operands, Guard { operand: 0, group: g });
        let pb = emit::presence_expr(target, &operands, Guard { operand: 1, group: g });
        let a_ref = emit::group_ref_str(target, &operands, GroupRef { operand: 0, group: g });
        let b_ref = emit::group_ref_str(target, &operands, GroupRef { operand: 1, group: g });
        _ = writeln!(s, "if (({pa}) && ({pb})) {{");
        for i in 0..layout.group(g).len() {
            _ = writeln!(
                s,
                "\tif ({abs}({a_ref}[{i}] - {b_ref}[{i}]) > {eps_name}) return {no};"
            );
        }
        _ = writeln!(s, "}} else if ({pa}) {{");
        for i in 0..layout.group(g).len() {
            _ = writeln!(s, "\tif ({abs}({a_ref}[{i}]) > {eps_name}) return {no};");
        }
        _ = writeln!(s, "}} else if ({pb}) {{");
        for i in 0..layout.group(g).len() {
            _ = writeln!(s, "\tif ({abs}({b_ref}[{i}]) > {eps_name}) return {no};");
        }
        _ = writeln!(s, "}}");
    }
    _ = writeln!(s, "return {};", emit::bool_lit(target, true));
    s
}

/// The body of a zero test with tolerance `eps_name`
pub fn is_zero_body(
    spec: &Spec,
    target: Target,
    ft: &FloatType,
    operand: Operand,
    eps_name: &str,
) -> String {
    let layout = &spec.layout;
    let operands = vec![operand];
    let abs = emit::abs_call(target, ft);
    let no = emit::bool_lit(target, false);
    let mut s = emit::expand_operands_str(target, spec, ft, &operands);
    for g in 0..layout.nb_groups() {
        let pa = emit::presence_expr(target, &operands, Guard { operand: 0, group: g });
        let a_ref = emit::group_ref_str(target, &operands, GroupRef { operand: 0, group: g });
        _ = writeln!(s, "if ({pa}) {{");
        for i in 0..layout.group(g).len() {
            _ = writeln!(s, "\tif ({abs}({a_ref}[{i}]) > {eps_name}) return {no};");
        }
        _ = writeln!(s, "}}");
    }
    _ = writeln!(s, "return {};", emit::bool_lit(target, true));
    s
}

/// The body of the grade-usage query: a bitmap over grades, bit `g` set
/// when any group of grade `g` is present
pub fn grade_bitmap_body(spec: &Spec, target: Target, ft: &FloatType, operand: Operand) -> String {
    let layout = &spec.layout;
    let operands = vec![operand];
    let mut s = if target.is_c_family() {
        String::new()
    } else {
        emit::expand_operands_str(target, spec, ft, &operands)
    };
    _ = writeln!(s, "int gb = 0;");
    for g in 0..layout.nb_groups() {
        let pa = emit::presence_expr(target, &operands, Guard { operand: 0, group: g });
        _ = writeln!(s, "if ({pa}) gb |= {};", 1u32 << layout.group_grade(g));
    }
    _ = writeln!(s, "return gb;");
    s
}

#[cfg(test)]
mod test {
    use super::*;

    fn euclid_3d() -> (Spec, CgData) {
        let spec = Spec::euclidean("c", 3);
        let mut cgd = CgData::default();
        write_casn_parts(&spec, Target::C, &mut cgd);
        (spec, cgd)
    }

    #[test]
    fn same_size_groups_share_part_bodies() {
        let (_, cgd) = euclid_3d();
        // the scalar and pseudoscalar groups both hold one coordinate
        assert!(cgd.def.contains(
            "void double_copy_group_0(const double *A, double *C) {\n\tC[0] = A[0];\n}"
        ));
        assert!(cgd.def.contains(
            "void double_copy_group_3(const double *A, double *C) {\n\
            \tdouble_copy_group_0(A, C);\n}"
        ));
        assert!(cgd.def.contains(
            "void double_add_group_1(const double *A, const double *B, double *C) {\n\
            \tC[0] = A[0] + B[0];\n\tC[1] = A[1] + B[1];\n\tC[2] = A[2] + B[2];\n}"
        ));
        assert!(cgd.def.contains("\tC[0] = A[0] - B[0];"));
    }

    #[test]
    fn copy_mul_parts_and_scale_assembly() {
        let (spec, cgd) = euclid_3d();
        assert!(cgd.def.contains(
            "void double_copy_mul_group_1(const double *A, double s, double *C) {\n\
            \tC[0] = A[0]*s;\n\tC[1] = A[1]*s;\n\tC[2] = A[2]*s;\n}"
        ));
        // one-coordinate groups share the body
        assert!(cgd.def.contains(
            "void double_copy_mul_group_3(const double *A, double s, double *C) {\n\
            \tdouble_copy_mul_group_0(A, s, C);\n}"
        ));
        let ft = &spec.float_types[0];
        let body = scale_body(&spec, Target::C, ft, Operand::gmv("A"), "s", "R");
        assert!(body.contains("if (A->gu & 2) {"));
        assert!(body.contains("\tdouble_copy_mul_group_1(_A[1], s, c + 1);"));
        assert!(body.contains("double_compress(c, R->c, &(R->gu), 0.0, A->gu);"));
        let mut managed = CgData::default();
        write_casn_parts(&spec, Target::CSharp, &mut managed);
        assert!(managed.def.contains(
            "protected internal static void double_copy_mul_group_1(double[] A, double s, double[] C)"
        ));
    }

    #[test]
    fn reverse_negates_the_middle_grades() {
        let (spec, _) = euclid_3d();
        let ft = &spec.float_types[0];
        let body = toggle_sign_body(
            &spec,
            Target::C,
            ft,
            ToggleSign::Reverse,
            Operand::gmv("A"),
            "R",
        );
        // grades 0 and 1 copy, grades 2 and 3 negate
        assert!(body.contains("\tdouble_copy_group_1(_A[1], c + 1);"));
        assert!(body.contains("\tdouble_neg_group_2(_A[2], c + 4);"));
        assert!(body.contains("\tdouble_neg_group_3(_A[3], c + 7);"));
        // the result's usage equals the source's usage
        assert!(body.contains("double_compress(c, R->c, &(R->gu), 0.0, A->gu);"));
    }

    #[test]
    fn addition_dispatches_on_operand_presence() {
        let (spec, _) = euclid_3d();
        let ft = &spec.float_types[0];
        let body = add_sub_body(
            &spec,
            Target::C,
            ft,
            false,
            [Operand::gmv("A"), Operand::gmv("B")],
            "R",
        );
        assert!(body.contains("if ((A->gu & 2) && (B->gu & 2)) {"));
        assert!(body.contains("\tdouble_add_group_1(_A[1], _B[1], c + 1);"));
        assert!(body.contains("} else if (A->gu & 2) {"));
        assert!(body.contains("\tdouble_copy_group_1(_A[1], c + 1);"));
        assert!(body.contains("\tdouble_copy_group_1(_B[1], c + 1);"));
        let sub = add_sub_body(
            &spec,
            Target::C,
            ft,
            true,
            [Operand::gmv("A"), Operand::gmv("B")],
            "R",
        );
        assert!(sub.contains("\tdouble_sub_group_1(_A[1], _B[1], c + 1);"));
        // a group present only in the subtrahend is negated
        assert!(sub.contains("\tdouble_neg_group_1(_B[1], c + 1);"));
    }

    #[test]
    fn grade_extraction_consults_the_selector() {
        let (spec, _) = euclid_3d();
        let ft = &spec.float_types[0];
        let body = grade_extract_body(
            &spec,
            Target::C,
            ft,
            Operand::gmv("A"),
            "group_bitmap",
            "R",
        );
        assert!(body.contains("if ((group_bitmap & 4) && (A->gu & 4)) {"));
        assert!(body.contains("\tdouble_copy_group_2(_A[2], c + 4);"));
    }

    #[test]
    fn comparisons_and_grade_bitmap() {
        let (spec, _) = euclid_3d();
        let ft = &spec.float_types[0];
        let eq = equals_body(
            &spec,
            Target::C,
            ft,
            [Operand::gmv("A"), Operand::gmv("B")],
            "eps",
        );
        assert!(eq.contains("\tif (fabs(_A[2][1] - _B[2][1]) > eps) return 0;"));
        assert!(eq.contains("\tif (fabs(_A[1][0]) > eps) return 0;"));
        assert!(eq.trim_end().ends_with("return 1;"));
        let zero = is_zero_body(&spec, Target::CSharp, ft, Operand::gmv("A"), "eps");
        assert!(zero.contains("\tif (Math.Abs(ac[3][0]) > eps) return false;"));
        let gb = grade_bitmap_body(&spec, Target::C, ft, Operand::gmv("A"));
        assert!(gb.contains("if (A->gu & 4) gb |= 4;"));
        assert!(gb.contains("if (A->gu & 8) gb |= 8;"));
    }
}
