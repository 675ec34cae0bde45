use super::{Col, Emf, GenModel, GenParams, Machine};

/// Subtransient model with transient E'q only on the rotor d-axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifth;

pub type GenModel5 = GenModel<Fifth>;

impl Machine for Fifth {
    const STATE_NAMES: &'static [&'static str] = &["id", "iq", "delta", "freq", "eqp", "edpp", "eqpp"];
    const JAC_SIZE: usize = 34;
    const ED: Emf = Emf::State(3);
    const EQ: Emf = Emf::State(4);

    fn stator_reactances(p: &GenParams) -> (f64, f64) {
        (p.xqpp, p.xdpp)
    }

    fn flux_initialize(p: &GenParams, id: f64, _iq: f64, ed: f64, eq: f64, diff: &mut [f64]) -> f64 {
        diff[3] = ed;
        diff[4] = eq;
        diff[2] = eq - (p.xdp - p.xdpp) * id;
        diff[2] - (p.xd - p.xdp) * id
    }

    fn flux_derivative(p: &GenParams, id: f64, iq: f64, diff: &[f64], ef: f64, out: &mut [f64]) {
        out[2] = (-diff[2] + (p.xd - p.xdp) * id + ef) / p.tdop;
        out[3] = (-diff[3] - (p.xq - p.xqpp) * iq) / p.tqopp;
        out[4] = (-diff[4] + diff[2] + (p.xdp - p.xdpp) * id) / p.tdopp;
    }

    fn flux_jacobian(p: &GenParams, _id: f64, _iq: f64, _diff: &[f64], emit: &mut dyn FnMut(usize, Col, f64)) {
        emit(2, Col::Id, (p.xd - p.xdp) / p.tdop);
        emit(2, Col::State(2), -1.0 / p.tdop);
        emit(2, Col::Field, 1.0 / p.tdop);

        emit(3, Col::Iq, -(p.xq - p.xqpp) / p.tqopp);
        emit(3, Col::State(3), -1.0 / p.tqopp);

        emit(4, Col::Id, (p.xdp - p.xdpp) / p.tdopp);
        emit(4, Col::State(2), 1.0 / p.tdopp);
        emit(4, Col::State(4), -1.0 / p.tdopp);
    }
}
