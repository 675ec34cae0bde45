use super::{Col, Emf, GenModel, GenParams, Machine};

/// Full subtransient model: E'd, E'q, E''d and E''q.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sixth;

pub type GenModel6 = GenModel<Sixth>;

impl Machine for Sixth {
    const STATE_NAMES: &'static [&'static str] = &["id", "iq", "delta", "freq", "edp", "eqp", "edpp", "eqpp"];
    const JAC_SIZE: usize = 40;
    const ED: Emf = Emf::State(4);
    const EQ: Emf = Emf::State(5);

    fn default_params() -> GenParams {
        GenParams {
            xqp: 0.30,
            d: 0.03,
            ..GenParams::default()
        }
    }

    fn stator_reactances(p: &GenParams) -> (f64, f64) {
        (p.xqpp, p.xdpp)
    }

    fn flux_initialize(p: &GenParams, id: f64, iq: f64, ed: f64, eq: f64, diff: &mut [f64]) -> f64 {
        diff[4] = ed;
        diff[5] = eq;
        diff[3] = eq - (p.xdp - p.xdpp) * id;
        diff[2] = ed + (p.xqp - p.xqpp) * iq;
        diff[3] - (p.xd - p.xdp) * id
    }

    fn flux_derivative(p: &GenParams, id: f64, iq: f64, diff: &[f64], ef: f64, out: &mut [f64]) {
        out[2] = (-diff[2] - (p.xq - p.xqp) * iq) / p.tqop;
        out[3] = (-diff[3] + (p.xd - p.xdp) * id + ef) / p.tdop;
        out[4] = (-diff[4] + diff[2] - (p.xqp - p.xqpp) * iq) / p.tqopp;
        out[5] = (-diff[5] + diff[3] + (p.xdp - p.xdpp) * id) / p.tdopp;
    }

    fn flux_jacobian(p: &GenParams, _id: f64, _iq: f64, _diff: &[f64], emit: &mut dyn FnMut(usize, Col, f64)) {
        // E'd, E'q
        emit(2, Col::Iq, -(p.xq - p.xqp) / p.tqop);
        emit(2, Col::State(2), -1.0 / p.tqop);
        emit(3, Col::Id, (p.xd - p.xdp) / p.tdop);
        emit(3, Col::State(3), -1.0 / p.tdop);
        emit(3, Col::Field, 1.0 / p.tdop);

        // E''d
        emit(4, Col::Iq, -(p.xqp - p.xqpp) / p.tqopp);
        emit(4, Col::State(2), 1.0 / p.tqopp);
        emit(4, Col::State(4), -1.0 / p.tqopp);

        // E''q
        emit(5, Col::Id, (p.xdp - p.xdpp) / p.tdopp);
        emit(5, Col::State(3), 1.0 / p.tdopp);
        emit(5, Col::State(5), -1.0 / p.tdopp);
    }
}
