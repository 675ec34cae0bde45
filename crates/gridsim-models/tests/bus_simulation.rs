//! Time-domain runs of a bus with mixed children through the reference integrator.

use gridsim_core::model::find_model;
use gridsim_core::offsets::{layout_entries, prepare};
use gridsim_core::solver::{ImplicitEuler, IntegratorConfig, JacobianStorage, SolverKind};
use gridsim_core::{DynamicModel, SolveMode, StateData};
use gridsim_models::bus::{BusChild, InfiniteBus};
use gridsim_models::genmodel::{GenModel3, GenModel6};
use gridsim_models::motor::MotorLoad;

fn system() -> InfiniteBus {
    let mut bus = InfiniteBus::new("B1", 1.0, 0.0);
    bus.add(BusChild::Generator {
        model: Box::new(GenModel6::new("G1")),
        dispatch: [0.8, 0.2],
    });
    bus.add(BusChild::Generator {
        model: Box::new(GenModel3::new("G2")),
        dispatch: [0.4, 0.05],
    });
    bus.add(BusChild::Load {
        model: Box::new(MotorLoad::new("M1")),
        demand: 0.5,
    });
    bus.add(BusChild::Link("B2".into()));
    bus.initialize_sizes(0.0, 0);
    bus.initialize_values(&[], &[]).unwrap();
    bus
}

fn integrator(jacobian: JacobianStorage, solver: SolverKind) -> ImplicitEuler {
    ImplicitEuler::new(IntegratorConfig {
        step: 0.01,
        jacobian,
        solver,
        ..IntegratorConfig::default()
    })
    .unwrap()
}

#[test]
fn layout_follows_insertion_order() {
    let mut bus = system();
    let mode = SolveMode::DAE;
    let n = prepare(&mut bus, &mode);
    // bus 2 + G1 (2 + 6) + G2 (2 + 3) + M1 1
    assert_eq!(n, 16);

    let entries = layout_entries(&bus, &mode);
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["B1", "G1", "G2", "M1"]);
    let alg: Vec<Option<usize>> = entries.iter().map(|e| e.offsets.alg_offset).collect();
    assert_eq!(alg[..3], [Some(0), Some(2), Some(4)]);
    let diff: Vec<Option<usize>> = entries.iter().map(|e| e.offsets.diff_offset).collect();
    assert_eq!(diff[1..], [Some(6), Some(12), Some(15)]);
}

#[test]
fn initialized_system_holds_steady() {
    for (jacobian, solver) in [
        (JacobianStorage::Dense, SolverKind::Gauss),
        (JacobianStorage::Sparse, SolverKind::Faer),
    ] {
        let mut bus = system();
        let mut euler = integrator(jacobian, solver);
        euler.initialize(&mut bus, 0.0);
        let start = euler.state().to_vec();
        assert!(euler.equilibrium_residual(&bus) < 1e-8);

        let steps = euler.run_until(&mut bus, 0.2, |_, _, _| {}).unwrap();
        assert_eq!(steps, 20);
        for (a, b) in euler.state().iter().zip(&start) {
            assert!((a - b).abs() < 1e-6, "drifted from {} to {}", b, a);
        }
    }
}

#[test]
fn net_injection_balances_dispatch_and_demand() {
    let mut bus = system();
    let mode = SolveMode::DAE;
    let n = prepare(&mut bus, &mode);
    let mut state = vec![0.0; n];
    bus.guess_state(0.0, &mut state, None, &mode);
    let sd = StateData::new(0.0, &state);
    let net = bus.outputs(&[], &sd, &mode);
    assert!((net[0] - (0.8 + 0.4 - 0.5)).abs() < 1e-8);
}

#[test]
fn voltage_dip_accelerates_the_machines() {
    let mut bus = system();
    let mut euler = integrator(JacobianStorage::Sparse, SolverKind::Gauss);
    euler.initialize(&mut bus, 0.0);
    euler.run_until(&mut bus, 0.05, |_, _, _| {}).unwrap();

    bus.set_param("voltage", 0.85).unwrap();
    let mut worst = 0.0_f64;
    euler
        .run_until(&mut bus, 0.15, |_, report, _| {
            worst = worst.max(report.residual_norm);
        })
        .unwrap();
    assert!(worst < 1e-8);

    assert!((bus.local_state()[0] - 0.85).abs() < 1e-10);
    let g1 = find_model(&bus, "G1").unwrap();
    let speed = g1.local_state()[3];
    assert!(speed > 1.0, "rotor speed {}", speed);
}

#[test]
fn child_outputs_report_each_machine() {
    let mut bus = system();
    let mode = SolveMode::DAE;
    let n = prepare(&mut bus, &mode);
    let mut state = vec![0.0; n];
    bus.guess_state(0.0, &mut state, None, &mode);
    let sd = StateData::new(0.0, &state);
    let outputs = bus.child_outputs(&sd, &mode);
    let names: Vec<&str> = outputs.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, ["G1", "G2", "M1"]);
    assert!((outputs[0].1[0] - 0.8).abs() < 1e-8);
    assert!((outputs[1].1[1] - 0.05).abs() < 1e-8);
    assert!((outputs[2].1[0] - 0.5).abs() < 1e-8);
}
