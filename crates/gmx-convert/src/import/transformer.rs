//! Transformer parameter conversion, import direction.
//!
//! Interprets the three base-conversion codes (CW ratio, CZ impedance, CM
//! magnetizing admittance), converts raw winding parameters to an
//! engineering-unit equivalent circuit with a discretized tap table,
//! relocates winding-2's ratio and the magnetizing shunt onto the
//! winding-1 side, and performs the star transform for three-winding
//! units.
//!
//! Unsupported codes and a negative radicand in the load-loss back-solve
//! are unrecoverable; a negative magnetizing susceptance clamps to zero
//! with a recorded warning.

use gmx_core::{
    Attachment, ConversionDiagnostics, Degrees, GmxError, GmxResult, Kilovolts, MegavoltAmperes,
    Ohms, Siemens, TapChanger, TapKind, TapStep, ThreeWindingTransformer, TransformerLeg,
    TwoWindingTransformer,
};
use num_complex::Complex64;
use tracing::debug;

use crate::context::PerUnitContext;
use crate::records::{TransformerRecord, WindingRecord};

/// Absolute tolerance when matching a declared ratio/angle against a
/// discretized tap step. A declared value further away than this from
/// every step gets its own inserted step instead of snapping.
pub const TAP_MATCH_TOLERANCE: f64 = 1e-5;

/// Resolved attachment and voltage base of one transformer end.
#[derive(Debug, Clone)]
pub struct TransformerEnd {
    pub attachment: Attachment,
    pub bus_base: Kilovolts,
}

/// Series impedance in per-unit on the system base.
///
/// CZ 1: already per-unit on the system base. CZ 2: per-unit on the
/// winding base, rescaled. CZ 3: R is the load loss in watts and X the
/// impedance magnitude on the winding base; X is back-solved before
/// rescaling.
pub(crate) fn resolve_impedance(
    r_raw: f64,
    x_raw: f64,
    winding_base: MegavoltAmperes,
    cz: i32,
    sbase: MegavoltAmperes,
    element: &str,
) -> GmxResult<Complex64> {
    match cz {
        1 => Ok(Complex64::new(r_raw, x_raw)),
        2 => Ok(Complex64::new(r_raw, x_raw) * (sbase.value() / winding_base.value())),
        3 => {
            let r = r_raw / (1e6 * winding_base.value());
            let radicand = x_raw * x_raw - r * r;
            if radicand < 0.0 {
                return Err(GmxError::Numeric {
                    element: element.to_string(),
                    detail: format!(
                        "load-loss back-solve: |Z|^2 - R^2 = {:e} < 0 (R={}, |Z|={})",
                        radicand, r, x_raw
                    ),
                });
            }
            let z = Complex64::new(r, radicand.sqrt());
            Ok(z * (sbase.value() / winding_base.value()))
        }
        code => Err(GmxError::Convention {
            element: element.to_string(),
            field: "CZ",
            code,
        }),
    }
}

/// Magnetizing admittance G + jB in per-unit on the system base.
///
/// CM 1: already per-unit on the system base. CM 2: G derives from the
/// no-load loss in watts, B from the total admittance magnitude on the
/// winding base; rounding can push the radicand slightly negative, which
/// clamps B to zero with a warning rather than failing the record.
pub(crate) fn resolve_magnetizing(
    mag1: f64,
    mag2: f64,
    winding_base: MegavoltAmperes,
    cm: i32,
    sbase: MegavoltAmperes,
    element: &str,
    conv: &mut ConversionDiagnostics,
) -> GmxResult<Complex64> {
    match cm {
        1 => Ok(Complex64::new(mag1, mag2)),
        2 => {
            let g = mag1 / (1e6 * winding_base.value());
            let y = mag2.abs();
            let radicand = y * y - g * g;
            let b = if radicand < 0.0 {
                conv.add_clamp(
                    "transformer",
                    &format!(
                        "magnetizing susceptance radicand {:e} < 0, clamping B to zero",
                        radicand
                    ),
                    element,
                );
                0.0
            } else {
                -radicand.sqrt()
            };
            Ok(Complex64::new(g, b) * (winding_base.value() / sbase.value()))
        }
        code => Err(GmxError::Convention {
            element: element.to_string(),
            field: "CM",
            code,
        }),
    }
}

/// Off-nominal ratio of one winding from its declared tap value.
///
/// CW 1: the declared value is the ratio. CW 2: the declared value is in
/// kV, divided by the bus base. CW 3: the declared value is per-unit of
/// the winding's nominal voltage.
pub(crate) fn resolve_ratio(
    windv: f64,
    nomv: Kilovolts,
    bus_base: Kilovolts,
    cw: i32,
    ctx: &PerUnitContext,
    element: &str,
) -> GmxResult<f64> {
    match cw {
        1 => Ok(windv),
        2 => Ok(windv / bus_base.value()),
        3 => {
            let nominal = ctx.effective_nominal(nomv, bus_base);
            Ok(windv * nominal.value() / bus_base.value())
        }
        code => Err(GmxError::Convention {
            element: element.to_string(),
            field: "CW",
            code,
        }),
    }
}

/// Delta (pairwise) to star impedances.
pub(crate) fn star_from_delta(
    z12: Complex64,
    z23: Complex64,
    z31: Complex64,
) -> (Complex64, Complex64, Complex64) {
    let z1 = (z12 + z31 - z23) / 2.0;
    let z2 = (z12 + z23 - z31) / 2.0;
    let z3 = (z23 + z31 - z12) / 2.0;
    (z1, z2, z3)
}

/// Tap table for one winding, plus the continuously-declared current
/// ratio and angle that must be located in it.
struct WindingTable {
    kind: TapKind,
    steps: Vec<TapStep>,
    current_ratio: f64,
    current_angle: f64,
}

/// Build the discretized tap table of one winding.
///
/// `ntp > 1` with a ratio-tap-changer code and a structurally zero angle
/// interpolates ratios between the declared bounds; a phase-shifter code
/// interpolates angles. Anything else collapses to a single step carrying
/// the declared values.
///
/// The exchange format counts phase angles positively in the opposite
/// direction from the target model, so angles negate here (and negate
/// back on export).
fn build_winding_table(
    w: &WindingRecord,
    cw: i32,
    bus_base: Kilovolts,
    ctx: &PerUnitContext,
    element: &str,
) -> GmxResult<WindingTable> {
    let current_ratio = resolve_ratio(w.windv, w.nomv, bus_base, cw, ctx, element)?;
    let current_angle = -w.ang.value();

    if w.ntp > 1 && w.cod.abs() == 3 {
        let mut steps = Vec::with_capacity(w.ntp);
        for i in 0..w.ntp {
            let raw = w.rmi + (w.rma - w.rmi) * i as f64 / (w.ntp - 1) as f64;
            steps.push(TapStep {
                ratio: current_ratio,
                angle: Degrees(-raw),
                ..TapStep::neutral()
            });
        }
        return Ok(WindingTable {
            kind: TapKind::Phase,
            steps,
            current_ratio,
            current_angle,
        });
    }

    if w.ntp > 1 && w.cod.abs() == 1 && w.ang.value() == 0.0 {
        let mut steps = Vec::with_capacity(w.ntp);
        for i in 0..w.ntp {
            let raw = w.rmi + (w.rma - w.rmi) * i as f64 / (w.ntp - 1) as f64;
            let ratio = resolve_ratio(raw, w.nomv, bus_base, cw, ctx, element)?;
            steps.push(TapStep {
                ratio,
                angle: Degrees(0.0),
                ..TapStep::neutral()
            });
        }
        return Ok(WindingTable {
            kind: TapKind::Ratio,
            steps,
            current_ratio,
            current_angle,
        });
    }

    let kind = if w.cod.abs() == 3 {
        TapKind::Phase
    } else {
        TapKind::Ratio
    };
    Ok(WindingTable {
        kind,
        steps: vec![TapStep {
            ratio: current_ratio,
            angle: Degrees(current_angle),
            ..TapStep::neutral()
        }],
        current_ratio,
        current_angle,
    })
}

fn step_quantity(kind: TapKind, step: &TapStep) -> f64 {
    match kind {
        TapKind::Ratio => step.ratio,
        TapKind::Phase => step.angle.value(),
    }
}

/// Locate the step nearest the declared quantity, inserting a new step in
/// monotonic position when none matches within [`TAP_MATCH_TOLERANCE`].
/// Returns the selected position.
pub(crate) fn find_or_insert_step(
    steps: &mut Vec<TapStep>,
    kind: TapKind,
    ratio: f64,
    angle: f64,
) -> usize {
    let target = match kind {
        TapKind::Ratio => ratio,
        TapKind::Phase => angle,
    };
    let mut best: Option<(usize, f64)> = None;
    for (i, step) in steps.iter().enumerate() {
        let dist = (step_quantity(kind, step) - target).abs();
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((i, dist));
        }
    }
    if let Some((i, dist)) = best {
        if dist <= TAP_MATCH_TOLERANCE {
            return i;
        }
    }

    let ascending = match (steps.first(), steps.last()) {
        (Some(first), Some(last)) => step_quantity(kind, first) <= step_quantity(kind, last),
        _ => true,
    };
    let position = steps
        .iter()
        .position(|s| {
            let q = step_quantity(kind, s);
            if ascending {
                q > target
            } else {
                q < target
            }
        })
        .unwrap_or(steps.len());
    steps.insert(
        position,
        TapStep {
            ratio,
            angle: Degrees(angle),
            ..TapStep::neutral()
        },
    );
    position
}

/// Move the magnetizing shunt from "at the node" to "between tap and
/// series impedance": each step's shunt correction scales with the
/// squared magnitude of the complex ratio it moved past.
fn relocate_shunt(steps: &mut [TapStep]) {
    for step in steps.iter_mut() {
        let a = Complex64::from_polar(step.ratio, step.angle.to_radians());
        let norm = a.norm_sqr();
        step.g_pct = 100.0 * ((1.0 + step.g_pct / 100.0) * norm - 1.0);
        step.b_pct = 100.0 * ((1.0 + step.b_pct / 100.0) * norm - 1.0);
    }
}

/// Convert a raw two-winding record into the target equivalent circuit.
///
/// The series impedance ends up in ohms at end 2's voltage base with
/// winding-2's off-nominal ratio folded in; the single tap changer sits
/// on end 1.
pub fn import_two_winding(
    rec: &TransformerRecord,
    ends: &[TransformerEnd; 2],
    ctx: &PerUnitContext,
    conv: &mut ConversionDiagnostics,
) -> GmxResult<TwoWindingTransformer> {
    let label = rec.label();
    let z_pu = resolve_impedance(rec.r12, rec.x12, rec.sbase12, rec.cz, ctx.sbase, &label)?;
    let y_pu = resolve_magnetizing(
        rec.mag1, rec.mag2, rec.sbase12, rec.cm, ctx.sbase, &label, conv,
    )?;

    let w1 = &rec.windings[0];
    let w2 = &rec.windings[1];
    let ratio2 = resolve_ratio(w2.windv, w2.nomv, ends[1].bus_base, rec.cw, ctx, &label)?;
    let rated_u1 = ctx.effective_nominal(w1.nomv, ends[0].bus_base);
    let rated_u2 = ctx.effective_nominal(w2.nomv, ends[1].bus_base);

    // Engineering units at end 2, with winding-2's ratio relocated onto
    // end 1 (impedance picks up ratio2^2).
    let u2 = rated_u2.value();
    let z = z_pu * (ratio2 * ratio2) * (u2 * u2 / ctx.sbase.value());
    let y = y_pu * (ctx.sbase.value() / (u2 * u2));

    let mut table = build_winding_table(w1, rec.cw, ends[0].bus_base, ctx, &label)?;
    for step in &mut table.steps {
        step.ratio /= ratio2;
    }
    let position = find_or_insert_step(
        &mut table.steps,
        table.kind,
        table.current_ratio / ratio2,
        table.current_angle,
    );
    relocate_shunt(&mut table.steps);

    conv.stats.transformers += 1;
    debug!(transformer = %label, steps = table.steps.len(), position, "converted 2-winding transformer");

    Ok(TwoWindingTransformer {
        id: label,
        end1: ends[0].attachment.clone(),
        end2: ends[1].attachment.clone(),
        rated_u1,
        rated_u2,
        r: Ohms(z.re),
        x: Ohms(z.im),
        g: Siemens(y.re),
        b: Siemens(y.im),
        tap_changer: Some(TapChanger {
            kind: table.kind,
            steps: table.steps,
            position,
        }),
    })
}

/// Convert a raw three-winding record into a star of three legs.
///
/// The three pairwise impedances become leg impedances via the star
/// transform; each leg carries its own tap changer, and the magnetizing
/// shunt attaches to leg 1 only. The star node's voltage base is
/// winding 1's rated voltage.
pub fn import_three_winding(
    rec: &TransformerRecord,
    ends: &[TransformerEnd; 3],
    ctx: &PerUnitContext,
    conv: &mut ConversionDiagnostics,
) -> GmxResult<ThreeWindingTransformer> {
    let label = rec.label();
    let z12 = resolve_impedance(rec.r12, rec.x12, rec.sbase12, rec.cz, ctx.sbase, &label)?;
    let z23 = resolve_impedance(rec.r23, rec.x23, rec.sbase23, rec.cz, ctx.sbase, &label)?;
    let z31 = resolve_impedance(rec.r31, rec.x31, rec.sbase31, rec.cz, ctx.sbase, &label)?;
    let (z1, z2, z3) = star_from_delta(z12, z23, z31);
    let y_pu = resolve_magnetizing(
        rec.mag1, rec.mag2, rec.sbase12, rec.cm, ctx.sbase, &label, conv,
    )?;

    let star_u = ctx.effective_nominal(rec.windings[0].nomv, ends[0].bus_base);
    let us = star_u.value();
    let y = y_pu * (ctx.sbase.value() / (us * us));

    let mut legs: Vec<TransformerLeg> = Vec::with_capacity(3);
    for (i, z_leg) in [z1, z2, z3].into_iter().enumerate() {
        let w = &rec.windings[i];
        let rated_u = ctx.effective_nominal(w.nomv, ends[i].bus_base);
        let z = z_leg * (us * us / ctx.sbase.value());

        let mut table = build_winding_table(w, rec.cw, ends[i].bus_base, ctx, &label)?;
        let position = find_or_insert_step(
            &mut table.steps,
            table.kind,
            table.current_ratio,
            table.current_angle,
        );
        if i == 0 {
            relocate_shunt(&mut table.steps);
        }

        legs.push(TransformerLeg {
            end: ends[i].attachment.clone(),
            rated_u,
            r: Ohms(z.re),
            x: Ohms(z.im),
            g: if i == 0 { Siemens(y.re) } else { Siemens(0.0) },
            b: if i == 0 { Siemens(y.im) } else { Siemens(0.0) },
            tap_changer: Some(TapChanger {
                kind: table.kind,
                steps: table.steps,
                position,
            }),
        });
    }
    let legs: [TransformerLeg; 3] = match legs.try_into() {
        Ok(legs) => legs,
        Err(_) => unreachable!(),
    };

    conv.stats.transformers += 1;
    debug!(transformer = %label, "converted 3-winding transformer");

    Ok(ThreeWindingTransformer {
        id: label,
        legs,
        star_u,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::tests::two_winding_fixture;
    use gmx_core::BusNum;

    fn ctx() -> PerUnitContext {
        PerUnitContext::new(MegavoltAmperes(100.0))
    }

    fn bus_end(vl: &str, bus: &str, base: f64) -> TransformerEnd {
        TransformerEnd {
            attachment: Attachment::Bus {
                voltage_level: vl.into(),
                bus: bus.into(),
            },
            bus_base: Kilovolts(base),
        }
    }

    #[test]
    fn test_impedance_codes() {
        let sbase = MegavoltAmperes(100.0);
        let wbase = MegavoltAmperes(50.0);

        let z = resolve_impedance(0.01, 0.05, wbase, 1, sbase, "T").unwrap();
        assert_eq!(z, Complex64::new(0.01, 0.05));

        let z = resolve_impedance(0.01, 0.05, wbase, 2, sbase, "T").unwrap();
        assert!((z.re - 0.02).abs() < 1e-12);
        assert!((z.im - 0.10).abs() < 1e-12);

        // load loss 500 kW on a 50 MVA base: R = 0.01 pu winding base
        let z = resolve_impedance(500_000.0, 0.05, wbase, 3, sbase, "T").unwrap();
        assert!((z.re - 0.02).abs() < 1e-12);
        let x_w = (0.05f64 * 0.05 - 0.01 * 0.01).sqrt();
        assert!((z.im - 2.0 * x_w).abs() < 1e-12);
    }

    #[test]
    fn test_impedance_negative_radicand_fails() {
        let err = resolve_impedance(
            10_000_000.0, // R = 0.2 pu on 50 MVA, |Z| = 0.05
            0.05,
            MegavoltAmperes(50.0),
            3,
            MegavoltAmperes(100.0),
            "T-1-2-1",
        )
        .unwrap_err();
        assert!(matches!(err, GmxError::Numeric { .. }));
    }

    #[test]
    fn test_unsupported_codes_fail_fast() {
        let err =
            resolve_impedance(0.0, 0.1, MegavoltAmperes(100.0), 4, MegavoltAmperes(100.0), "T")
                .unwrap_err();
        assert!(matches!(err, GmxError::Convention { field: "CZ", code: 4, .. }));

        let mut conv = ConversionDiagnostics::new();
        let err = resolve_magnetizing(
            0.0,
            0.0,
            MegavoltAmperes(100.0),
            9,
            MegavoltAmperes(100.0),
            "T",
            &mut conv,
        )
        .unwrap_err();
        assert!(matches!(err, GmxError::Convention { field: "CM", code: 9, .. }));

        let err = resolve_ratio(1.0, Kilovolts(0.0), Kilovolts(230.0), 0, &ctx(), "T").unwrap_err();
        assert!(matches!(err, GmxError::Convention { field: "CW", code: 0, .. }));
    }

    #[test]
    fn test_magnetizing_clamp() {
        let mut conv = ConversionDiagnostics::new();
        // no-load loss implies G larger than the declared |Y|
        let y = resolve_magnetizing(
            200_000.0, // G = 0.002 pu on 100 MVA
            0.001,
            MegavoltAmperes(100.0),
            2,
            MegavoltAmperes(100.0),
            "T",
            &mut conv,
        )
        .unwrap();
        assert_eq!(y.im, 0.0);
        assert!(y.re > 0.0);
        assert_eq!(conv.stats.clamped_values, 1);
        assert!(conv.diagnostics.has_warnings());
    }

    #[test]
    fn test_ratio_codes() {
        let c = ctx();
        assert_eq!(
            resolve_ratio(1.05, Kilovolts(0.0), Kilovolts(230.0), 1, &c, "T").unwrap(),
            1.05
        );
        assert!(
            (resolve_ratio(241.5, Kilovolts(0.0), Kilovolts(230.0), 2, &c, "T").unwrap() - 1.05)
                .abs()
                < 1e-12
        );
        // CW 3: per-unit of nominal, 1.05 * 231 / 230
        let r = resolve_ratio(1.05, Kilovolts(231.0), Kilovolts(230.0), 3, &c, "T").unwrap();
        assert!((r - 1.05 * 231.0 / 230.0).abs() < 1e-12);
    }

    #[test]
    fn test_star_transform_symmetry() {
        let z = Complex64::new(0.01, 0.1);
        let (z1, z2, z3) = star_from_delta(z, z, z);
        assert_eq!(z1, z / 2.0);
        assert_eq!(z2, z / 2.0);
        assert_eq!(z3, z / 2.0);
    }

    #[test]
    fn test_tap_search_is_idempotent() {
        let mut steps: Vec<TapStep> = (0..5)
            .map(|i| TapStep {
                ratio: 0.9 + 0.05 * i as f64,
                ..TapStep::neutral()
            })
            .collect();
        let before = steps.len();
        let pos = find_or_insert_step(&mut steps, TapKind::Ratio, 1.0, 0.0);
        assert_eq!(pos, 2);
        assert_eq!(steps.len(), before);
    }

    #[test]
    fn test_tap_search_inserts_unmatched() {
        let mut steps: Vec<TapStep> = (0..3)
            .map(|i| TapStep {
                ratio: 0.9 + 0.1 * i as f64,
                ..TapStep::neutral()
            })
            .collect();
        let pos = find_or_insert_step(&mut steps, TapKind::Ratio, 0.97, 0.0);
        assert_eq!(steps.len(), 4);
        assert_eq!(pos, 1);
        assert!((steps[1].ratio - 0.97).abs() < 1e-12);
        // table stays monotonic
        assert!(steps.windows(2).all(|w| w[0].ratio <= w[1].ratio));
    }

    #[test]
    fn test_two_winding_relocation_scenario() {
        // winding 2 at 1.05 off-nominal, CZ=1, R=0.01, X=0.05, ntp=1
        let mut rec = two_winding_fixture();
        rec.cz = 1;
        rec.cw = 1;
        rec.cm = 1;
        rec.r12 = 0.01;
        rec.x12 = 0.05;
        rec.mag1 = 0.0;
        rec.mag2 = 0.0;
        rec.windings[0].windv = 1.0;
        rec.windings[1].windv = 1.05;
        rec.windings[0].ntp = 1;

        let ends = [bus_end("VL-101", "B-101", 230.0), bus_end("VL-102", "B-102", 110.0)];
        let mut conv = ConversionDiagnostics::new();
        let t = import_two_winding(&rec, &ends, &ctx(), &mut conv).unwrap();

        // impedance scales by 1.05^2 relative to the unrelocated value
        let scale = 110.0 * 110.0 / 100.0;
        assert!((t.r.value() - 0.01 * 1.05 * 1.05 * scale).abs() < 1e-9);
        assert!((t.x.value() - 0.05 * 1.05 * 1.05 * scale).abs() < 1e-9);

        // single pass-through step shifted by winding 2's ratio
        let tc = t.tap_changer.unwrap();
        assert_eq!(tc.steps.len(), 1);
        assert_eq!(tc.position, 0);
        assert!((tc.steps[0].ratio - 1.0 / 1.05).abs() < 1e-12);
        assert_eq!(conv.stats.transformers, 1);
    }

    #[test]
    fn test_ratio_relocation_identity() {
        // moving rho2 onto winding 1 must equal evaluating the two-ratio
        // circuit directly, across the arbitrary-rho2 range
        for rho2 in [0.8, 0.93, 1.0, 1.07, 1.2] {
            let mut rec = two_winding_fixture();
            rec.cz = 1;
            rec.cw = 1;
            rec.cm = 1;
            rec.mag1 = 0.0;
            rec.mag2 = 0.0;
            rec.r12 = 0.004;
            rec.x12 = 0.08;
            rec.windings[0].windv = 1.02;
            rec.windings[1].windv = rho2;
            rec.windings[0].ntp = 1;

            let ends = [bus_end("VL-1", "B-1", 230.0), bus_end("VL-2", "B-2", 110.0)];
            let mut conv = ConversionDiagnostics::new();
            let t = import_two_winding(&rec, &ends, &ctx(), &mut conv).unwrap();

            let scale = 110.0 * 110.0 / 100.0;
            assert!((t.x.value() - 0.08 * rho2 * rho2 * scale).abs() < 1e-9);
            let tc = t.tap_changer.unwrap();
            assert!((tc.current_step().ratio - 1.02 / rho2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ratio_tap_table_interpolation() {
        let mut rec = two_winding_fixture();
        rec.cz = 1;
        rec.cw = 1;
        rec.cm = 1;
        rec.mag1 = 0.0;
        rec.mag2 = 0.0;
        rec.windings[0] = WindingRecord {
            windv: 1.0,
            rma: 1.1,
            rmi: 0.9,
            ntp: 5,
            cod: 1,
            ..WindingRecord::default()
        };
        rec.windings[1].windv = 1.0;

        let ends = [bus_end("VL-1", "B-1", 230.0), bus_end("VL-2", "B-2", 110.0)];
        let mut conv = ConversionDiagnostics::new();
        let t = import_two_winding(&rec, &ends, &ctx(), &mut conv).unwrap();

        let tc = t.tap_changer.unwrap();
        assert_eq!(tc.kind, TapKind::Ratio);
        assert_eq!(tc.steps.len(), 5);
        assert!((tc.steps[0].ratio - 0.9).abs() < 1e-12);
        assert!((tc.steps[4].ratio - 1.1).abs() < 1e-12);
        // declared 1.0 matches the middle step exactly, no insertion
        assert_eq!(tc.position, 2);
        assert!(tc.is_monotonic());
    }

    #[test]
    fn test_phase_tap_table_negates_angles() {
        let mut rec = two_winding_fixture();
        rec.cz = 1;
        rec.cw = 1;
        rec.cm = 1;
        rec.mag1 = 0.0;
        rec.mag2 = 0.0;
        rec.windings[0] = WindingRecord {
            windv: 1.0,
            ang: Degrees(10.0),
            rma: 20.0,
            rmi: -20.0,
            ntp: 5,
            cod: 3,
            ..WindingRecord::default()
        };
        rec.windings[1].windv = 1.0;

        let ends = [bus_end("VL-1", "B-1", 230.0), bus_end("VL-2", "B-2", 110.0)];
        let mut conv = ConversionDiagnostics::new();
        let t = import_two_winding(&rec, &ends, &ctx(), &mut conv).unwrap();

        let tc = t.tap_changer.unwrap();
        assert_eq!(tc.kind, TapKind::Phase);
        assert_eq!(tc.steps.len(), 5);
        // raw +10 degrees selects the model step at -10
        assert!((tc.current_step().angle.value() + 10.0).abs() < 1e-12);
        assert!(tc.is_monotonic());
    }

    #[test]
    fn test_shunt_relocation_percentage() {
        let mut rec = two_winding_fixture();
        rec.cz = 1;
        rec.cw = 1;
        rec.cm = 1;
        rec.mag1 = 0.002;
        rec.mag2 = -0.015;
        rec.r12 = 0.0;
        rec.x12 = 0.05;
        rec.windings[0].windv = 1.1;
        rec.windings[0].ntp = 1;
        rec.windings[1].windv = 1.0;

        let ends = [bus_end("VL-1", "B-1", 230.0), bus_end("VL-2", "B-2", 110.0)];
        let mut conv = ConversionDiagnostics::new();
        let t = import_two_winding(&rec, &ends, &ctx(), &mut conv).unwrap();

        let tc = t.tap_changer.unwrap();
        let step = tc.current_step();
        // correction makes the effective shunt scale with |a|^2
        assert!((step.g_pct - 100.0 * (1.1f64.powi(2) - 1.0)).abs() < 1e-9);
        assert!((step.b_pct - step.g_pct).abs() < 1e-12);
        assert!(t.g.value() > 0.0);
        assert!(t.b.value() < 0.0);
    }

    #[test]
    fn test_three_winding_star() {
        let mut rec = two_winding_fixture();
        rec.bus3 = Some(BusNum::new(103));
        rec.cz = 1;
        rec.cw = 1;
        rec.cm = 1;
        rec.mag1 = 0.001;
        rec.mag2 = -0.01;
        rec.r12 = 0.01;
        rec.x12 = 0.1;
        rec.r23 = 0.01;
        rec.x23 = 0.1;
        rec.r31 = 0.01;
        rec.x31 = 0.1;
        for w in &mut rec.windings {
            w.windv = 1.0;
            w.ntp = 1;
        }

        let ends = [
            bus_end("VL-101", "B-101", 230.0),
            bus_end("VL-102", "B-102", 110.0),
            bus_end("VL-103", "B-103", 20.0),
        ];
        let mut conv = ConversionDiagnostics::new();
        let t = import_three_winding(&rec, &ends, &ctx(), &mut conv).unwrap();

        // equal pairwise impedances give z/2 on every leg
        let scale = 230.0 * 230.0 / 100.0;
        for leg in &t.legs {
            assert!((leg.r.value() - 0.005 * scale).abs() < 1e-9);
            assert!((leg.x.value() - 0.05 * scale).abs() < 1e-9);
        }
        // shunt only on leg 1
        assert!(t.legs[0].g.value() > 0.0);
        assert_eq!(t.legs[1].g.value(), 0.0);
        assert_eq!(t.legs[2].g.value(), 0.0);
        assert_eq!(t.star_u.value(), 230.0);
    }
}
