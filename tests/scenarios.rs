use lines3d::io::{read_snapshot, write_snapshot};
use lines3d::sim::molecule::{Level, Transition};
use lines3d::sim::nlte::FixedBudget;
use lines3d::{
    CollisionPartner, ConvergenceDriver, ConvergenceState, Grid, GridConfig, ImageConfig,
    ImageKind, Mesh, MolData, NlteConfig, Point, RayTracer, UniformModel,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const AU: f64 = 1.495978707e11;

fn co_like() -> MolData {
    let levels = vec![
        Level {
            energy: 0.,
            weight: 1.,
        },
        Level {
            energy: 3.845,
            weight: 3.,
        },
    ];
    let lines = vec![Transition::new(1, 0, 7.2e-8, 115.271e9)];
    let partners = vec![CollisionPartner {
        id: 1,
        temperatures: vec![10., 20., 40.],
        transitions: vec![(1, 0)],
        down: vec![vec![3.0e-17, 3.2e-17, 3.6e-17]],
    }];
    MolData::new("co", 28., levels, lines, partners).unwrap()
}

fn random_cloud(n: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(n);
    while points.len() < n {
        let (x, y, z): (f64, f64, f64) = (
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if x * x + y * y + z * z < 1. {
            points.push(Point::new(x * 100. * AU, y * 100. * AU, z * 100. * AU));
        }
    }
    points
}

fn cloud_grid(model: &UniformModel) -> Grid {
    let mesh = Mesh::from_points(random_cloud(40, 11)).unwrap();
    Grid::new(mesh, model, vec![co_like()], GridConfig::new()).unwrap()
}

#[test]
fn test_isolated_two_level_vertex() {
    // No neighbours and no collision partners: the vertex only sees the background.
    let levels = vec![
        Level {
            energy: 0.,
            weight: 1.,
        },
        Level {
            energy: 2.,
            weight: 3.,
        },
    ];
    let mol = MolData::new("x", 10., levels, vec![Transition::new(1, 0, 1e-5, 6e10)], vec![])
        .unwrap();
    let mesh = Mesh::from_graph(vec![Point::new(0., 0., 0.)], &[], &[]).unwrap();
    let model = UniformModel::new(1e8, 30., 1e-6, 100.);
    let mut grid = Grid::new(mesh, &model, vec![mol], GridConfig::new()).unwrap();

    let report = ConvergenceDriver::new(NlteConfig::new())
        .run(&mut grid)
        .unwrap();
    assert_eq!(report.state, ConvergenceState::Converged);

    let line = &grid.mols()[0].lines[0];
    let j = grid.mols()[0].background[0];
    let expected = line.b_lu * j / (line.a + line.b_ul * j);
    let pops = &grid.point(0).mol[0].pops;
    assert!((pops[1] / pops[0] - expected).abs() / expected < 1e-9);
}

#[test]
fn test_free_vertex_between_sink_and_lte() -> anyhow::Result<()> {
    let model = UniformModel::new(1e12, 20., 1e-4, 100.);
    let points = vec![Point::new(0., 0., 0.), Point::new(3e16, 0., 0.)];
    let mesh = Mesh::from_graph(points, &[(0, 1)], &[1])?;
    let mut grid = Grid::new(mesh, &model, vec![co_like()], GridConfig::new())?;
    grid.set_boundary_populations(1, 0, &[0.9, 0.1])?;

    let report = ConvergenceDriver::new(NlteConfig::new()).run(&mut grid)?;
    assert_eq!(report.state, ConvergenceState::Converged);
    assert!(report.iterations <= NlteConfig::new().max_iterations);

    let lte = grid.lte_populations(0, 0)[1];
    let n1 = grid.point(0).mol[0].pops[1];
    assert!(n1 > 0.1, "n1 = {n1}");
    assert!(n1 <= lte + 1e-9, "n1 = {n1}, LTE = {lte}");
    assert_eq!(grid.point(1).mol[0].pops, vec![0.9, 0.1]);
    Ok(())
}

#[test]
fn test_results_independent_of_thread_count() {
    let model = UniformModel::new(1e10, 20., 1e-6, 150.);
    let solve = |threads: usize| {
        let mut grid = cloud_grid(&model);
        ConvergenceDriver::new(NlteConfig {
            max_iterations: 3,
            num_threads: threads,
            ..NlteConfig::new()
        })
        .with_budget(FixedBudget { per_neighbour: 20 })
        .run(&mut grid)
        .unwrap();
        grid.snapshot()
    };
    assert_eq!(solve(1), solve(4));
}

#[test]
fn test_solve_snapshot_and_trace() -> anyhow::Result<()> {
    let model = UniformModel::new(1e10, 20., 1e-6, 150.);
    let mut grid = cloud_grid(&model);
    let report = ConvergenceDriver::new(NlteConfig {
        max_iterations: 4,
        ..NlteConfig::new()
    })
    .run(&mut grid)?;
    assert_eq!(report.history.len(), report.iterations);
    for p in grid.points() {
        let pops = &p.mol[0].pops;
        assert!(pops.iter().all(|x| *x >= 0.));
        assert!((pops.iter().sum::<f64>() - 1.).abs() < 1e-6);
    }

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pops.json");
    write_snapshot(&path, &grid.snapshot())?;
    let mut restored = cloud_grid(&model);
    restored.restore(&read_snapshot(&path)?)?;
    assert_eq!(restored.snapshot(), grid.snapshot());

    let mut config = ImageConfig::new(ImageKind::Line {
        species: 0,
        line: 0,
        nchan: 9,
        velres: 80.,
    });
    config.pxls = 10;
    config.imgres = 25.;
    config.distance = 3.08567758e16;
    let tracer = RayTracer::new();
    let images = tracer.trace(&grid, &[config.clone()])?;
    let again = tracer.trace(&restored, &[config])?;
    assert_eq!(images[0].intensity, again[0].intensity);

    // At rest the line is centred on zero velocity.
    let spec = images[0].spectrum();
    assert!(spec[4] > 0.);
    for c in 0..9 {
        assert!((spec[c] - spec[8 - c]).abs() <= 1e-9 * spec[4]);
    }
    Ok(())
}
