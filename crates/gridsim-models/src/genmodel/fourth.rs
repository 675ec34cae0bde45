use super::{Col, Emf, GenModel, GenParams, Machine};

/// Two-axis transient model with E'd and E'q.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fourth;

pub type GenModel4 = GenModel<Fourth>;

impl Machine for Fourth {
    const STATE_NAMES: &'static [&'static str] = &["id", "iq", "delta", "freq", "edp", "eqp"];
    const JAC_SIZE: usize = 30;
    const ED: Emf = Emf::State(2);
    const EQ: Emf = Emf::State(3);

    fn stator_reactances(p: &GenParams) -> (f64, f64) {
        (p.xqp, p.xdp)
    }

    fn flux_initialize(p: &GenParams, id: f64, _iq: f64, ed: f64, eq: f64, diff: &mut [f64]) -> f64 {
        diff[2] = ed;
        diff[3] = eq;
        eq - (p.xd - p.xdp) * id
    }

    fn flux_derivative(p: &GenParams, id: f64, iq: f64, diff: &[f64], ef: f64, out: &mut [f64]) {
        out[2] = (-diff[2] - (p.xq - p.xqp) * iq) / p.tqop;
        out[3] = (-diff[3] + (p.xd - p.xdp) * id + ef) / p.tdop;
    }

    fn flux_jacobian(p: &GenParams, _id: f64, _iq: f64, _diff: &[f64], emit: &mut dyn FnMut(usize, Col, f64)) {
        emit(2, Col::Iq, -(p.xq - p.xqp) / p.tqop);
        emit(2, Col::State(2), -1.0 / p.tqop);

        emit(3, Col::Id, (p.xd - p.xdp) / p.tdop);
        emit(3, Col::State(3), -1.0 / p.tdop);
        emit(3, Col::Field, 1.0 / p.tdop);
    }
}
