//! Transformer parameter conversion, export direction.
//!
//! The inverse of the import pipeline: engineering-unit equivalent
//! circuits back to raw records. The model's chosen convention codes are
//! fixed (CW=1, CZ=1, CM=1), so impedances serialize per-unit on the
//! system base and the declared tap value is the current step's ratio
//! with the angle sign flipped back. The full step table is never
//! reconstructed; only its bounds and step count survive.

use gmx_core::{
    BusNum, GmxError, GmxResult, Kilovolts, MegavoltAmperes, TapChanger, TapKind,
    ThreeWindingTransformer, TwoWindingTransformer,
};
use num_complex::Complex64;

use crate::records::{TransformerRecord, WindingRecord};

/// Invert the ratio-code formula: from an off-nominal ratio back to the
/// raw declared tap value.
pub(crate) fn raw_tap_value(
    ratio: f64,
    nomv: Kilovolts,
    bus_base: Kilovolts,
    cw: i32,
    element: &str,
) -> GmxResult<f64> {
    match cw {
        1 => Ok(ratio),
        2 => Ok(ratio * bus_base.value()),
        3 => {
            let nominal = if nomv.value() == 0.0 { bus_base } else { nomv };
            Ok(ratio * bus_base.value() / nominal.value())
        }
        code => Err(GmxError::Convention {
            element: element.to_string(),
            field: "CW",
            code,
        }),
    }
}

/// Raw winding parameters from a resolved tap changer.
///
/// Tap values and ratio bounds go back through the ratio-code inversion;
/// angles negate back to the raw sign convention. Bounds come from the
/// extreme steps; a single-step table exports as a fixed winding.
fn winding_from_tap(
    tap: Option<&TapChanger>,
    rated_u: Kilovolts,
    bus_base: Kilovolts,
    cw: i32,
    element: &str,
) -> GmxResult<WindingRecord> {
    let mut w = WindingRecord {
        nomv: rated_u,
        ..WindingRecord::default()
    };
    let Some(tap) = tap else {
        return Ok(w);
    };
    let current = tap.current_step();
    w.windv = raw_tap_value(current.ratio, rated_u, bus_base, cw, element)?;
    w.ang = gmx_core::Degrees(-current.angle.value());
    w.ntp = tap.steps.len();
    if tap.steps.len() > 1 {
        match tap.kind {
            TapKind::Ratio => {
                w.cod = 1;
                w.rmi = f64::INFINITY;
                w.rma = f64::NEG_INFINITY;
                for step in &tap.steps {
                    let raw = raw_tap_value(step.ratio, rated_u, bus_base, cw, element)?;
                    w.rmi = w.rmi.min(raw);
                    w.rma = w.rma.max(raw);
                }
            }
            TapKind::Phase => {
                w.cod = 3;
                let raw = tap.steps.iter().map(|s| -s.angle.value());
                w.rmi = raw.clone().fold(f64::INFINITY, f64::min);
                w.rma = tap.steps.iter().map(|s| -s.angle.value()).fold(f64::NEG_INFINITY, f64::max);
            }
        }
    }
    Ok(w)
}

/// Flatten a two-winding transformer back to a raw record.
///
/// The relocated circuit exports as-is: winding 2 is at nominal and the
/// whole off-nominal ratio sits on winding 1.
pub fn export_two_winding(
    t: &TwoWindingTransformer,
    bus1: BusNum,
    bus2: BusNum,
    circuit: String,
    sbase: MegavoltAmperes,
    bases: [Kilovolts; 2],
) -> GmxResult<TransformerRecord> {
    let u2 = t.rated_u2.value();
    let z_pu = Complex64::new(t.r.value(), t.x.value()) * (sbase.value() / (u2 * u2));
    let y_pu = Complex64::new(t.g.value(), t.b.value()) * (u2 * u2 / sbase.value());
    let cw = 1;

    Ok(TransformerRecord {
        bus1,
        bus2,
        bus3: None,
        circuit,
        name: t.id.clone(),
        in_service: true,
        cw,
        cz: 1,
        cm: 1,
        mag1: y_pu.re,
        mag2: y_pu.im,
        r12: z_pu.re,
        x12: z_pu.im,
        sbase12: sbase,
        r23: 0.0,
        x23: 0.0,
        sbase23: sbase,
        r31: 0.0,
        x31: 0.0,
        sbase31: sbase,
        windings: [
            winding_from_tap(t.tap_changer.as_ref(), t.rated_u1, bases[0], cw, &t.id)?,
            WindingRecord {
                nomv: t.rated_u2,
                ..WindingRecord::default()
            },
            WindingRecord::default(),
        ],
    })
}

/// Flatten a three-winding transformer back to a raw record, inverting
/// the star transform into pairwise impedances.
pub fn export_three_winding(
    t: &ThreeWindingTransformer,
    buses: [BusNum; 3],
    circuit: String,
    sbase: MegavoltAmperes,
    bases: [Kilovolts; 3],
) -> GmxResult<TransformerRecord> {
    let us = t.star_u.value();
    let to_pu = sbase.value() / (us * us);
    let z: Vec<Complex64> = t
        .legs
        .iter()
        .map(|leg| Complex64::new(leg.r.value(), leg.x.value()) * to_pu)
        .collect();
    let z12 = z[0] + z[1];
    let z23 = z[1] + z[2];
    let z31 = z[2] + z[0];
    let y_pu = Complex64::new(t.legs[0].g.value(), t.legs[0].b.value()) * (us * us / sbase.value());
    let cw = 1;

    Ok(TransformerRecord {
        bus1: buses[0],
        bus2: buses[1],
        bus3: Some(buses[2]),
        circuit,
        name: t.id.clone(),
        in_service: true,
        cw,
        cz: 1,
        cm: 1,
        mag1: y_pu.re,
        mag2: y_pu.im,
        r12: z12.re,
        x12: z12.im,
        sbase12: sbase,
        r23: z23.re,
        x23: z23.im,
        sbase23: sbase,
        r31: z31.re,
        x31: z31.im,
        sbase31: sbase,
        windings: [
            winding_from_tap(t.legs[0].tap_changer.as_ref(), t.legs[0].rated_u, bases[0], cw, &t.id)?,
            winding_from_tap(t.legs[1].tap_changer.as_ref(), t.legs[1].rated_u, bases[1], cw, &t.id)?,
            winding_from_tap(t.legs[2].tap_changer.as_ref(), t.legs[2].rated_u, bases[2], cw, &t.id)?,
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmx_core::{Attachment, Degrees, Ohms, Siemens, TapStep, TransformerLeg};

    fn bus_att(vl: &str, bus: &str) -> Attachment {
        Attachment::Bus {
            voltage_level: vl.into(),
            bus: bus.into(),
        }
    }

    #[test]
    fn test_raw_tap_value_inverts_ratio_codes() {
        assert_eq!(raw_tap_value(1.05, Kilovolts(0.0), Kilovolts(230.0), 1, "T").unwrap(), 1.05);
        assert!(
            (raw_tap_value(1.05, Kilovolts(0.0), Kilovolts(230.0), 2, "T").unwrap() - 241.5).abs()
                < 1e-9
        );
        let v = raw_tap_value(1.05 * 231.0 / 230.0, Kilovolts(231.0), Kilovolts(230.0), 3, "T")
            .unwrap();
        assert!((v - 1.05).abs() < 1e-12);
        assert!(raw_tap_value(1.0, Kilovolts(0.0), Kilovolts(230.0), 7, "T").is_err());
    }

    #[test]
    fn test_winding_tap_values_follow_the_ratio_code() {
        let tap = TapChanger {
            kind: TapKind::Ratio,
            steps: vec![
                TapStep {
                    ratio: 0.95,
                    ..TapStep::neutral()
                },
                TapStep {
                    ratio: 1.05,
                    ..TapStep::neutral()
                },
            ],
            position: 1,
        };
        // code 2: declared value is the winding voltage in kV
        let w = winding_from_tap(Some(&tap), Kilovolts(0.0), Kilovolts(230.0), 2, "T").unwrap();
        assert!((w.windv - 1.05 * 230.0).abs() < 1e-9);
        assert!((w.rmi - 0.95 * 230.0).abs() < 1e-9);
        assert!((w.rma - 1.05 * 230.0).abs() < 1e-9);
        assert!(winding_from_tap(Some(&tap), Kilovolts(0.0), Kilovolts(230.0), 7, "T").is_err());
    }

    #[test]
    fn test_two_winding_serializes_per_unit_on_system_base() {
        let t = TwoWindingTransformer {
            id: "T-101-102-1".into(),
            end1: bus_att("VL-1", "B-1"),
            end2: bus_att("VL-2", "B-2"),
            rated_u1: Kilovolts(230.0),
            rated_u2: Kilovolts(110.0),
            r: Ohms(0.01 * 121.0),
            x: Ohms(0.05 * 121.0),
            g: Siemens(0.001 / 121.0),
            b: Siemens(-0.01 / 121.0),
            tap_changer: Some(TapChanger {
                kind: TapKind::Ratio,
                steps: vec![TapStep {
                    ratio: 0.98,
                    ..TapStep::neutral()
                }],
                position: 0,
            }),
        };
        let rec = export_two_winding(
            &t,
            BusNum::new(1),
            BusNum::new(2),
            "1".into(),
            MegavoltAmperes(100.0),
            [Kilovolts(230.0), Kilovolts(110.0)],
        )
        .unwrap();

        // Z_pu = Z_ohm * sbase / u2^2, u2^2/sbase = 121
        assert!((rec.r12 - 0.01).abs() < 1e-12);
        assert!((rec.x12 - 0.05).abs() < 1e-12);
        assert!((rec.mag1 - 0.001).abs() < 1e-12);
        assert!((rec.mag2 + 0.01).abs() < 1e-12);
        assert_eq!(rec.windings[0].windv, 0.98);
        assert_eq!(rec.windings[1].windv, 1.0);
        assert_eq!(rec.windings[0].ntp, 1);
        assert_eq!(rec.windings[0].cod, 0);
    }

    #[test]
    fn test_phase_winding_negates_angle_back() {
        let tap = TapChanger {
            kind: TapKind::Phase,
            steps: vec![
                TapStep {
                    angle: Degrees(10.0),
                    ..TapStep::neutral()
                },
                TapStep {
                    angle: Degrees(0.0),
                    ..TapStep::neutral()
                },
                TapStep {
                    angle: Degrees(-10.0),
                    ..TapStep::neutral()
                },
            ],
            position: 0,
        };
        let w = winding_from_tap(Some(&tap), Kilovolts(230.0), Kilovolts(230.0), 1, "T").unwrap();
        assert_eq!(w.ang, Degrees(-10.0));
        assert_eq!(w.cod, 3);
        assert_eq!(w.ntp, 3);
        assert_eq!(w.rmi, -10.0);
        assert_eq!(w.rma, 10.0);
    }

    #[test]
    fn test_three_winding_inverts_star_transform() {
        // legs of z/2 each must reproduce pairwise z
        let us = 230.0;
        let scale = us * us / 100.0;
        let leg = |_i: usize| TransformerLeg {
            end: bus_att("VL-1", "B-1"),
            rated_u: Kilovolts(us),
            r: Ohms(0.005 * scale),
            x: Ohms(0.05 * scale),
            g: Siemens(0.0),
            b: Siemens(0.0),
            tap_changer: None,
        };
        let t = ThreeWindingTransformer {
            id: "T-1-2-3-1".into(),
            legs: [leg(0), leg(1), leg(2)],
            star_u: Kilovolts(us),
        };
        let rec = export_three_winding(
            &t,
            [BusNum::new(1), BusNum::new(2), BusNum::new(3)],
            "1".into(),
            MegavoltAmperes(100.0),
            [Kilovolts(us); 3],
        )
        .unwrap();
        assert!((rec.r12 - 0.01).abs() < 1e-12);
        assert!((rec.x12 - 0.1).abs() < 1e-12);
        assert!((rec.r23 - 0.01).abs() < 1e-12);
        assert!((rec.x31 - 0.1).abs() < 1e-12);
    }
}
