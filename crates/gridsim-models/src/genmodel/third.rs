use super::{Col, Emf, GenModel, GenParams, Machine};

/// One-axis model with transient E'q.
#[derive(Debug, Clone, Copy, Default)]
pub struct Third;

pub type GenModel3 = GenModel<Third>;

impl Machine for Third {
    const STATE_NAMES: &'static [&'static str] = &["id", "iq", "delta", "freq", "eqp"];
    const JAC_SIZE: usize = 24;
    const ED: Emf = Emf::Zero;
    const EQ: Emf = Emf::State(2);

    fn stator_reactances(p: &GenParams) -> (f64, f64) {
        (p.xq, p.xdp)
    }

    fn flux_initialize(p: &GenParams, id: f64, _iq: f64, _ed: f64, eq: f64, diff: &mut [f64]) -> f64 {
        diff[2] = eq;
        eq - (p.xd - p.xdp) * id
    }

    fn flux_derivative(p: &GenParams, id: f64, _iq: f64, diff: &[f64], ef: f64, out: &mut [f64]) {
        out[2] = (-diff[2] + (p.xd - p.xdp) * id + ef) / p.tdop;
    }

    fn flux_jacobian(p: &GenParams, _id: f64, _iq: f64, _diff: &[f64], emit: &mut dyn FnMut(usize, Col, f64)) {
        emit(2, Col::Id, (p.xd - p.xdp) / p.tdop);
        emit(2, Col::State(2), -1.0 / p.tdop);
        emit(2, Col::Field, 1.0 / p.tdop);
    }
}
