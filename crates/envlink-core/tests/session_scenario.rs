//! End-to-end scenarios driving the sampler and the session controller
//! together against scripted link, transport and sensor doubles.

use envlink_core::config::AgentConfig;
use envlink_core::model::{Reading, RpcRequest, RPC_GET_LED_SWITCH, RPC_SET_LED_SWITCH};
use envlink_core::sampler::SensorSampler;
use envlink_core::testing::{
    ManualClock, MockLink, MockSensor, MockTransport, RecordingOutput, TransportCall,
};
use envlink_core::{CycleOutcome, RpcDispatcher, SessionController, SessionPhase, SharedEnvironment};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::thread;

fn config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.broker.host = "broker.local".to_string();
    config.broker.access_token = "device-token".to_string();
    config
}

#[test]
fn test_cold_start_to_telemetry() {
    let config = config();
    let env = SharedEnvironment::new();
    let output = RecordingOutput::new();
    let clock = ManualClock::new();

    let mut controller = SessionController::new(
        MockLink::connected().with_connect_after(2),
        MockTransport::new(),
        clock.clone(),
        RpcDispatcher::with_led(output.clone()),
        env.clone(),
        &config,
    );
    let mut sampler = SensorSampler::new(
        MockSensor::new().then_read(Ok(Reading::new(23.5, 60.2))),
        env.clone(),
        &config.timing,
    );

    controller.bootstrap().unwrap();
    assert_eq!(controller.state().phase(), SessionPhase::TransportDown);

    // Sampler has not produced anything yet: zeros go out
    assert_eq!(
        controller.tick(),
        CycleOutcome::Completed {
            commands_handled: 0
        }
    );
    assert_eq!(
        controller.transport().telemetry(),
        vec![("temperature".to_string(), 0.0), ("humidity".to_string(), 0.0)]
    );

    sampler.sample_once().unwrap();
    controller.tick();

    let telemetry = controller.transport().telemetry();
    assert_eq!(
        &telemetry[2..],
        &[
            ("temperature".to_string(), 23.5),
            ("humidity".to_string(), 60.2),
        ]
    );
    assert_eq!(
        controller.transport().calls()[0],
        TransportCall::Connect(
            "broker.local".to_string(),
            1883,
            "device-token".to_string()
        )
    );
}

#[test]
fn test_led_commands_round_trip() {
    let config = config();
    let output = RecordingOutput::new();
    let mut controller = SessionController::new(
        MockLink::connected(),
        MockTransport::new(),
        ManualClock::new(),
        RpcDispatcher::with_led(output.clone()),
        SharedEnvironment::new(),
        &config,
    );
    controller.tick();

    let transport = controller.transport_mut();
    transport.queue_rpc(RpcRequest::new("1", RPC_SET_LED_SWITCH, json!(true)));
    transport.queue_rpc(RpcRequest::new("2", RPC_GET_LED_SWITCH, json!({})));
    transport.queue_rpc(RpcRequest::new("3", "rebootDevice", json!(null)));
    transport.queue_rpc(RpcRequest::new("4", RPC_SET_LED_SWITCH, json!({"value": 0})));

    assert_eq!(
        controller.tick(),
        CycleOutcome::Completed {
            commands_handled: 3
        }
    );
    assert_eq!(
        controller.transport().responses(),
        vec![
            ("1".to_string(), json!(true)),
            ("2".to_string(), json!(true)),
            ("4".to_string(), json!(false)),
        ]
    );
    assert_eq!(output.history(), vec![true, false]);
}

#[test]
fn test_subscription_survives_broker_restart_without_resubscribe() {
    let config = config();
    let mut controller = SessionController::new(
        MockLink::connected(),
        MockTransport::new().with_connect_results([true, false, false, true]),
        ManualClock::new(),
        RpcDispatcher::with_led(RecordingOutput::new()),
        SharedEnvironment::new(),
        &config,
    );

    controller.tick();
    controller.transport_mut().drop_connection();

    assert_eq!(controller.tick(), CycleOutcome::TransportConnectFailed);
    assert_eq!(controller.tick(), CycleOutcome::TransportConnectFailed);
    assert!(matches!(
        controller.tick(),
        CycleOutcome::Completed { .. }
    ));

    assert_eq!(controller.transport().connect_count(), 4);
    assert_eq!(controller.transport().subscribe_count(), 1);
    assert_eq!(controller.state().phase(), SessionPhase::Subscribed);
}

#[test]
fn test_sampler_and_controller_on_separate_threads() {
    let config = config();
    let env = SharedEnvironment::new();

    let readings: Vec<_> = (0..50)
        .map(|i| Ok(Reading::new(20.0 + i as f32, 40.0 + i as f32)))
        .collect();
    let sensor = readings
        .into_iter()
        .fold(MockSensor::new(), |sensor, r| sensor.then_read(r));
    let mut sampler = SensorSampler::new(sensor, env.clone(), &config.timing);

    let mut controller = SessionController::new(
        MockLink::connected(),
        MockTransport::new(),
        ManualClock::new(),
        RpcDispatcher::with_led(RecordingOutput::new()),
        env,
        &config,
    );

    let sampler_thread = thread::spawn(move || {
        let clock = ManualClock::new();
        for _ in 0..50 {
            sampler.step(&clock);
        }
    });
    for _ in 0..50 {
        controller.tick();
    }
    sampler_thread.join().unwrap();

    // Every published pair came from the same reading
    let telemetry = controller.transport().telemetry();
    for pair in telemetry.chunks(2) {
        let temperature = pair[0].1;
        let humidity = pair[1].1;
        if temperature != 0.0 {
            assert_eq!(humidity - temperature, 20.0);
        } else {
            assert_eq!(humidity, 0.0);
        }
    }
}
