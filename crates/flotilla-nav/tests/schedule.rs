use flotilla_geom::{collides_within_step, Circle, Vec2};
use flotilla_nav::{
    Agent, NavConfig, NavError, NavRequest, Navigator, Preference, Resolution, World,
};
use proptest::prelude::*;

const ME: u32 = 0;
const THEM: u32 = 1;

fn avoid(agent: u32, x: f64, y: f64) -> NavRequest {
    NavRequest::new(agent, Vec2::new(x, y), Preference::AvoidEnemies)
}

fn velocity_of(resolution: &Resolution, agent: u32) -> Vec2 {
    resolution
        .command_for(agent)
        .map(|c| Vec2::from_heading(c.heading, c.thrust as f64))
        .unwrap_or(Vec2::ZERO)
}

/// Every pair of agents, moving as commanded (everyone else holding), stays apart for the step.
fn assert_collision_free(world: &World, resolution: &Resolution) {
    for (i, a) in world.agents.iter().enumerate() {
        for b in &world.agents[i + 1..] {
            let hit = collides_within_step(
                a.radius + b.radius,
                a.position,
                b.position,
                velocity_of(resolution, a.id),
                velocity_of(resolution, b.id),
            );
            assert!(!hit, "agents {} and {} collide: {resolution:?}", a.id, b.id);
        }
    }
}

fn assert_in_bounds(world: &World, config: &NavConfig, resolution: &Resolution) {
    let bounds = world.bounds(config.field.edge_margin);
    for command in &resolution.commands {
        let agent = world.agent(command.agent).expect("commanded agent exists");
        let landing = agent.position + velocity_of(resolution, command.agent);
        assert!(bounds.contains(landing), "agent {} leaves the field", command.agent);
    }
}

fn assert_accounted(requests: &[NavRequest], resolution: &Resolution) {
    assert_eq!(resolution.commands.len() + resolution.frozen.len(), requests.len());
    for request in requests {
        let commanded = resolution.command_for(request.agent).is_some();
        assert!(commanded != resolution.is_frozen(request.agent));
    }
}

fn head_on() -> (World, Vec<NavRequest>) {
    let world = World::new(40.0, 40.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(15.0, 20.0), 0.5))
        .with_agent(Agent::new(2, ME, Vec2::new(18.0, 20.0), 0.5));
    let requests = vec![avoid(1, 25.0, 20.0), avoid(2, 8.0, 20.0)];
    (world, requests)
}

#[test]
fn head_on_pair_is_steered_apart() {
    let (world, requests) = head_on();
    let mut nav = Navigator::new(NavConfig::default());
    let resolution = nav.resolve(&world, &requests).expect("valid input");

    assert!(resolution.frozen.is_empty());
    assert!(!resolution.degraded);
    assert_accounted(&requests, &resolution);
    assert_collision_free(&world, &resolution);
    assert_in_bounds(&world, nav.config(), &resolution);
}

#[test]
fn lone_agent_takes_its_best_move() {
    let world = World::new(40.0, 40.0, ME).with_agent(Agent::new(1, ME, Vec2::new(20.0, 20.0), 0.5));
    let requests = [avoid(1, 30.0, 20.0)];
    let resolution = Navigator::new(NavConfig::default())
        .resolve(&world, &requests)
        .expect("valid input");

    let command = resolution.command_for(1).expect("command");
    assert_eq!(command.thrust, 7);
    assert_eq!(command.heading.degrees(), 0);
    assert_eq!(resolution.to_wire(), "t 1 7 0");
}

#[test]
fn agent_boxed_in_by_the_field_edge_is_frozen_and_its_neighbor_clears_it() {
    let mut config = NavConfig::default();
    config.field.edge_margin = 10.0;

    // Agent 1 cannot get back inside the margin in one step; agent 2 is 3 units away.
    let world = World::new(40.0, 40.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(4.0, 4.0), 0.5))
        .with_agent(Agent::new(2, ME, Vec2::new(6.12, 6.12), 0.5));
    let requests = vec![avoid(1, 20.0, 20.0), avoid(2, 4.0, 4.0)];

    let mut nav = Navigator::new(config.clone());
    let resolution = nav.resolve(&world, &requests).expect("valid input");

    assert_eq!(resolution.frozen, vec![1]);
    let survivor = resolution.command_for(2).expect("neighbor keeps moving");
    assert!(survivor.thrust > 0);
    assert_collision_free(&world, &resolution);
    assert_in_bounds(&world, &config, &resolution);
}

#[test]
fn overlapping_agents_are_all_frozen() {
    let world = World::new(40.0, 40.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(20.0, 20.0), 0.5))
        .with_agent(Agent::new(2, ME, Vec2::new(20.3, 20.0), 0.5))
        .with_agent(Agent::new(3, ME, Vec2::new(5.0, 5.0), 0.5));
    let requests = vec![avoid(1, 30.0, 20.0), avoid(2, 10.0, 20.0), avoid(3, 5.0, 10.0)];

    let resolution = Navigator::new(NavConfig::default())
        .resolve(&world, &requests)
        .expect("valid input");

    assert_eq!(resolution.frozen, vec![1, 2]);
    assert!(resolution.command_for(3).is_some());
    assert_accounted(&requests, &resolution);
}

#[test]
fn idle_and_enemy_agents_are_treated_as_standing_obstacles() {
    let world = World::new(40.0, 40.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(10.0, 20.0), 0.5))
        .with_agent(Agent::new(2, ME, Vec2::new(13.5, 20.0), 0.5))
        .with_agent(Agent::new(3, THEM, Vec2::new(12.0, 22.0), 0.5).immobilized())
        .with_agent(Agent::new(4, ME, Vec2::new(10.0, 15.0), 0.5).immobilized());
    let requests = vec![avoid(1, 30.0, 20.0), avoid(4, 30.0, 15.0)];

    let resolution = Navigator::new(NavConfig::default())
        .resolve(&world, &requests)
        .expect("valid input");

    // Immobilized agents get neither a command nor a freeze.
    assert!(resolution.command_for(4).is_none());
    assert!(!resolution.is_frozen(4));
    assert!(resolution.command_for(2).is_none());
    assert!(resolution.command_for(1).is_some());
    assert_collision_free(&world, &resolution);
}

#[test]
fn static_obstacles_are_never_crossed() {
    let planet = Circle::new(Vec2::new(20.0, 20.0), 3.0);
    let world = World::new(40.0, 40.0, ME)
        .with_obstacle(planet)
        .with_agent(Agent::new(1, ME, Vec2::new(14.0, 20.0), 0.5));
    let requests = [avoid(1, 30.0, 20.0)];

    let resolution = Navigator::new(NavConfig::default())
        .resolve(&world, &requests)
        .expect("valid input");

    let command = resolution.command_for(1).expect("command");
    let start = Vec2::new(14.0, 20.0);
    let end = start + Vec2::from_heading(command.heading, command.thrust as f64);
    assert!(!flotilla_geom::segment_circle_intersect(start, end, planet.center, planet.radius, 0.6));
}

#[test]
fn exhausted_budget_degrades_but_stays_safe() {
    let mut config = NavConfig::default();
    config.schedule.soft_budget_ms = 0;
    let (world, requests) = head_on();

    let mut nav = Navigator::new(config.clone());
    let resolution = nav.resolve(&world, &requests).expect("valid input");

    assert!(resolution.degraded);
    assert_accounted(&requests, &resolution);
    assert_collision_free(&world, &resolution);
    assert_in_bounds(&world, &config, &resolution);
}

/// A 3x3 lattice two units apart, plus an agent overlapping the middle one.
fn dense_clump() -> (World, Vec<NavRequest>) {
    let mut world = World::new(60.0, 60.0, ME);
    let mut requests = Vec::new();
    for i in 0..9u32 {
        let position = Vec2::new(18.0 + (i % 3) as f64 * 2.0, 18.0 + (i / 3) as f64 * 2.0);
        world.agents.push(Agent::new(i + 1, ME, position, 0.5));
        requests.push(avoid(i + 1, 40.0, 25.0));
    }
    world.agents.push(Agent::new(10, ME, Vec2::new(20.3, 20.0), 0.5));
    requests.push(avoid(10, 40.0, 25.0));
    (world, requests)
}

#[test]
fn degraded_freezes_rescore_neighbors_within_the_window() {
    let (world, requests) = dense_clump();
    let normal = NavConfig::default();
    let mut hurried = NavConfig::default();
    hurried.schedule.soft_budget_ms = 0;

    let full = Navigator::new(normal.clone())
        .resolve(&world, &requests)
        .expect("valid input");
    let narrowed = Navigator::new(hurried.clone())
        .resolve(&world, &requests)
        .expect("valid input");

    assert!(!full.degraded);
    assert!(narrowed.degraded);
    for (config, resolution) in [(&normal, &full), (&hurried, &narrowed)] {
        assert!(resolution.is_frozen(5) && resolution.is_frozen(10));
        assert_accounted(&requests, resolution);
        assert_collision_free(&world, resolution);
        assert_in_bounds(&world, config, resolution);
    }

    // Both start from the same full ranking of every request.
    let initial = requests.len() * Navigator::new(normal).action_space().candidates().len();
    assert!(full.scored > initial);
    assert!(narrowed.scored >= initial);
    assert!(narrowed.scored < full.scored, "{} >= {}", narrowed.scored, full.scored);
}

#[test]
fn ring_converging_on_one_point_is_collision_free() {
    let center = Vec2::new(40.0, 40.0);
    let mut world = World::new(80.0, 80.0, ME);
    let mut requests = Vec::new();
    for i in 0..12u32 {
        let angle = i as f64 * std::f64::consts::TAU / 12.0;
        let offset = Vec2::new(angle.cos(), angle.sin()) * 6.0;
        world.agents.push(Agent::new(i + 1, ME, center + offset, 0.5));
        requests.push(NavRequest::new(i + 1, center - offset, Preference::AvoidEnemies));
    }

    let config = NavConfig::default();
    let resolution = Navigator::new(config.clone())
        .resolve(&world, &requests)
        .expect("valid input");

    assert_accounted(&requests, &resolution);
    assert_collision_free(&world, &resolution);
    assert_in_bounds(&world, &config, &resolution);
}

#[test]
fn resolution_is_deterministic_and_reuses_the_grid() {
    let (world, requests) = head_on();
    let mut nav = Navigator::new(NavConfig::default());
    let first = nav.resolve(&world, &requests).expect("valid input");
    let second = nav.resolve(&world, &requests).expect("valid input");
    let fresh = Navigator::new(NavConfig::default())
        .resolve(&world, &requests)
        .expect("valid input");

    assert_eq!(first.commands, second.commands);
    assert_eq!(first.commands, fresh.commands);
    assert_eq!(first.frozen, fresh.frozen);
    assert!(nav.grid().is_some());
}

#[test]
fn seek_requests_fall_back_to_moving_when_outnumbered() {
    let world = World::new(60.0, 60.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(20.0, 20.0), 0.5))
        .with_agent(Agent::new(7, THEM, Vec2::new(30.0, 20.0), 0.5))
        .with_agent(Agent::new(8, THEM, Vec2::new(30.0, 22.0), 0.5));
    let requests = [NavRequest::new(1, Vec2::new(30.0, 21.0), Preference::SeekEngagement)];

    let resolution = Navigator::new(NavConfig::default())
        .resolve(&world, &requests)
        .expect("valid input");
    assert!(resolution.command_for(1).is_some());
    assert_collision_free(&world, &resolution);
}

#[test]
fn invalid_requests_are_rejected() {
    let world = World::new(40.0, 40.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(10.0, 10.0), 0.5))
        .with_agent(Agent::new(2, THEM, Vec2::new(20.0, 20.0), 0.5));
    let mut nav = Navigator::new(NavConfig::default());

    assert_eq!(
        nav.resolve(&world, &[avoid(9, 0.0, 0.0)]),
        Err(NavError::UnknownAgent(9))
    );
    assert_eq!(
        nav.resolve(&world, &[avoid(2, 0.0, 0.0)]),
        Err(NavError::ForeignAgent { agent: 2, side: THEM, me: ME })
    );
    assert_eq!(
        nav.resolve(&world, &[avoid(1, 5.0, 5.0), avoid(1, 6.0, 6.0)]),
        Err(NavError::DuplicateRequest(1))
    );
    assert_eq!(
        nav.resolve(&world, &[avoid(1, f64::NAN, 5.0)]),
        Err(NavError::NonFiniteTarget(1))
    );
}

#[test]
fn invalid_worlds_are_rejected() {
    let mut nav = Navigator::new(NavConfig::default());
    let empty = World::new(0.0, 10.0, ME);
    assert!(matches!(nav.resolve(&empty, &[]), Err(NavError::EmptyField { .. })));

    let twins = World::new(40.0, 40.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(10.0, 10.0), 0.5))
        .with_agent(Agent::new(1, ME, Vec2::new(20.0, 20.0), 0.5));
    assert_eq!(nav.resolve(&twins, &[]), Err(NavError::DuplicateAgent(1)));
}

#[test]
fn huge_fields_are_rejected_before_allocating_a_grid() {
    let world = World::new(1e7, 1e7, ME).with_agent(Agent::new(1, ME, Vec2::new(10.0, 10.0), 0.5));
    let mut nav = Navigator::new(NavConfig::default());

    assert_eq!(
        nav.resolve(&world, &[avoid(1, 20.0, 10.0)]),
        Err(NavError::FieldTooLarge {
            width: 1e7,
            height: 1e7,
            max_cells: nav.config().grid.max_cells,
        })
    );
    assert!(nav.grid().is_none());

    let endless = World::new(f64::INFINITY, 40.0, ME);
    assert!(matches!(nav.resolve(&endless, &[]), Err(NavError::FieldTooLarge { .. })));
}

#[test]
fn applying_a_resolution_records_frozen_agents() {
    let mut world = World::new(40.0, 40.0, ME)
        .with_agent(Agent::new(1, ME, Vec2::new(20.0, 20.0), 0.5))
        .with_agent(Agent::new(2, ME, Vec2::new(20.2, 20.0), 0.5))
        .with_agent(Agent::new(3, ME, Vec2::new(5.0, 5.0), 0.5));
    world.agents[2].frozen = true;
    let requests = vec![avoid(1, 30.0, 20.0), avoid(2, 10.0, 20.0), avoid(3, 5.0, 10.0)];

    let resolution = Navigator::new(NavConfig::default())
        .resolve(&world, &requests)
        .expect("valid input");
    world.apply(&resolution);

    let frozen: Vec<u32> = world.agents.iter().filter(|a| a.frozen).map(|a| a.id).collect();
    assert_eq!(frozen, vec![1, 2]);
}

/// Agents on a jittered lattice so no two start overlapping.
fn arb_fleet() -> impl Strategy<Value = (World, Vec<NavRequest>)> {
    prop::collection::vec(
        (-1.0f64..1.0, -1.0f64..1.0, 5.0f64..55.0, 5.0f64..55.0, any::<bool>()),
        2..16,
    )
    .prop_map(|specs| {
        let mut world = World::new(60.0, 60.0, ME);
        let mut requests = Vec::new();
        for (i, (jx, jy, tx, ty, seek)) in specs.into_iter().enumerate() {
            let id = i as u32 + 1;
            let col = (i % 5) as f64;
            let row = (i / 5) as f64;
            let position = Vec2::new(20.0 + col * 4.0 + jx, 20.0 + row * 4.0 + jy);
            world.agents.push(Agent::new(id, ME, position, 0.5));
            let preference = if seek {
                Preference::SeekEngagement
            } else {
                Preference::AvoidEnemies
            };
            requests.push(NavRequest::new(id, Vec2::new(tx, ty), preference));
        }
        world.agents.push(Agent::new(100, THEM, Vec2::new(45.0, 45.0), 0.5));
        (world, requests)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn random_fleets_resolve_collision_free((world, requests) in arb_fleet()) {
        let config = NavConfig::default();
        let resolution = Navigator::new(config.clone()).resolve(&world, &requests).expect("valid input");
        assert_accounted(&requests, &resolution);
        assert_collision_free(&world, &resolution);
        assert_in_bounds(&world, &config, &resolution);
    }
}
