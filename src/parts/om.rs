//! Outermorphism application parts: one function per (source group,
//! destination group) pair with non-empty code
//!
//! Each basis blade of the source group is replaced by its image under
//! the outermorphism's domain-to-range mapping for that blade's grade.
//! Scalar groups are skipped, since outermorphisms fix scalars.

use ecow::EcoString;
use tracing::debug;

use crate::{
    dedup::CodeCache,
    emit::{self, Target},
    ir::*,
    parts::{group_assignments, part_exists, CgData, PartFnKey},
    spec::{FloatType, Spec},
    symbolic::{Multivector, ScalarExpr},
};

pub fn om_part_name(ft: &FloatType, src: usize, dst: usize) -> EcoString {
    format!("{}_{src}_{dst}", ft.mangle("apply_om")).into()
}

/// Writes the partial outermorphism application functions, recording each
/// pair's presence in `cgd.om_parts`. Outermorphisms are
/// metric-independent, so the keys carry no metric name.
pub fn write_om_parts(spec: &Spec, target: Target, cgd: &mut CgData) {
    let Some(gom) = &spec.gom else {
        return;
    };
    let layout = &spec.layout;
    let nb = layout.nb_groups();
    let access = if target == Target::C { "O->" } else { "O." };
    // a destination group may collect several same-grade source groups
    // when the layout is not grouped strictly by grade
    let op = if layout.is_grouped_by_grade() {
        AssignOp::Set
    } else {
        AssignOp::Add
    };

    for ft in &spec.float_types {
        let mut cache = CodeCache::new();
        for src in 0..nb {
            if layout.group_grade(src) == 0 {
                continue;
            }
            let input = layout.symbolic_group(src, "A");
            let mut image = Multivector::zero();
            for blade in input.blades() {
                let grade = blade.bitmap.count_ones() as u8;
                let domain = gom.domain_for_grade(grade);
                for (col, domain_blade) in domain.iter().enumerate() {
                    if domain_blade.bitmap == blade.bitmap {
                        let column = gom.image(grade, col, access);
                        image = image.add(
                            &column
                                .mul_scalar(&blade.weight)
                                .mul_scalar(&ScalarExpr::constant(domain_blade.scale)),
                        );
                        break;
                    }
                }
            }
            for dst in 0..nb {
                let name = om_part_name(ft, src, dst);
                let assignments = group_assignments(layout, "C", dst, &image, op);
                let non_empty = !assignments.is_empty();
                cgd.om_parts
                    .insert(PartFnKey::metric_free(ft, name.clone()), non_empty);
                if !non_empty {
                    continue;
                }
                let mut body = PartBody::Assign(assignments);
                if let Some(first) = cache.intern(&body, &name) {
                    body = PartBody::Forward { callee: first };
                }
                let part = PartFn {
                    name,
                    comment: format!(
                        "Computes the partial application of an outermorphism to a \
                        multivector (group {src} -> group {dst})"
                    ),
                    params: vec![
                        Param::Om("O".into()),
                        Param::In("A".into()),
                        Param::Out("C".into()),
                    ],
                    body,
                };
                let (decl, def) = emit::render_part_fn(target, spec, ft, &part);
                cgd.emit(decl, def);
            }
        }
    }
    debug!(parts = cgd.om_parts.len(), "wrote outermorphism parts");
}

/// The body of whole-multivector outermorphism application.
///
/// For a grouped-by-grade layout the result populates exactly the groups
/// the source had, so the source's usage bitmap is passed straight to
/// compression; otherwise the scratch is zeroed and compression scans all
/// groups.
pub fn apply_om_body(
    spec: &Spec,
    cgd: &CgData,
    target: Target,
    ft: &FloatType,
    operands: [Operand; 2],
    result_name: &str,
) -> String {
    let layout = &spec.layout;
    let nb = layout.nb_groups();
    let grouped = layout.is_grouped_by_grade();
    let mut steps = Vec::new();
    for src in 0..nb {
        if !operands[1].may_be_present(src) {
            continue;
        }
        let outer = (!operands[1].always_present(src))
            .then_some(Guard { operand: 1, group: src });
        for dst in 0..nb {
            let key = PartFnKey::metric_free(ft, om_part_name(ft, src, dst));
            if !part_exists(&cgd.om_parts, &key) {
                continue;
            }
            steps.push(Step {
                outer,
                inner: None,
                action: Action::Call(PartCall {
                    name: key.name,
                    om_operand: Some(0),
                    args: vec![GroupRef { operand: 1, group: src }],
                    dst: Dst::Group(dst),
                }),
            });
        }
    }
    let plan = CallPlan {
        operands: operands.to_vec(),
        scratch_coords: layout.total_coords(),
        zero_scratch: !grouped,
        norm_accumulator: false,
        steps,
        finish: Finish::Compress(if grouped {
            Usage::OfOperand(1)
        } else {
            Usage::Dynamic
        }),
    };
    emit::render_plan(target, spec, ft, &plan, result_name)
}
