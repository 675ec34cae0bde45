use super::{Col, Emf, GenModel, GenParams, Machine};

/// Classical model: constant voltage behind transient reactance.
///
/// The field input plays the role of E'q, so there are no flux states.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classical;

pub type GenModelClassical = GenModel<Classical>;

impl Machine for Classical {
    const STATE_NAMES: &'static [&'static str] = &["id", "iq", "delta", "freq"];
    const JAC_SIZE: usize = 20;
    const ED: Emf = Emf::Zero;
    const EQ: Emf = Emf::Field;

    fn angle_reactance(p: &GenParams) -> f64 {
        p.xdp
    }

    fn stator_reactances(p: &GenParams) -> (f64, f64) {
        (p.xdp, p.xdp)
    }

    fn flux_initialize(_p: &GenParams, _id: f64, _iq: f64, _ed: f64, eq: f64, _diff: &mut [f64]) -> f64 {
        eq
    }

    fn flux_derivative(_p: &GenParams, _id: f64, _iq: f64, _diff: &[f64], _ef: f64, _out: &mut [f64]) {}

    fn flux_jacobian(_p: &GenParams, _id: f64, _iq: f64, _diff: &[f64], _emit: &mut dyn FnMut(usize, Col, f64)) {}
}
