//! Unit tests for the deployment poller.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rstest::{fixture, rstest};

use super::*;
use crate::cartel::CartelError;
use crate::test_support::{FakeCartel, instance};

#[fixture]
fn poller() -> DeploymentPoller {
    DeploymentPoller::default()
        .with_initial_delay(Duration::ZERO)
        .with_interval_bounds(Duration::ZERO, Duration::ZERO)
}

#[fixture]
fn cartel() -> FakeCartel {
    let cartel = FakeCartel::new();
    cartel.insert_instance(instance("h1", "i-01"));
    cartel
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(60))
}

#[rstest]
#[case(DeploymentState::Succeeded, PollAction::Done)]
#[case(DeploymentState::Provisioning, PollAction::ContinuePolling)]
#[case(DeploymentState::Indeterminate, PollAction::ContinuePolling)]
#[case(DeploymentState::Other(String::from("rebooting")), PollAction::ContinuePolling)]
#[case(DeploymentState::Failed, PollAction::Fail(String::from("failed")))]
#[case(DeploymentState::Terminated, PollAction::Fail(String::from("terminated")))]
#[case(DeploymentState::ShuttingDown, PollAction::Fail(String::from("shutting-down")))]
fn next_action_classifies_states(#[case] state: DeploymentState, #[case] expected: PollAction) {
    assert_eq!(next_action(&state), expected);
}

#[rstest]
fn default_interval_stays_within_bounds() {
    let poller = DeploymentPoller::default();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let interval = poller.draw_interval(&mut rng);
        assert!(interval >= Duration::from_secs(5), "{interval:?}");
        assert!(interval <= Duration::from_secs(15), "{interval:?}");
    }
}

#[rstest]
#[tokio::test]
async fn waits_through_provisioning(poller: DeploymentPoller, cartel: FakeCartel) {
    cartel.push_deployment_states([
        DeploymentState::Provisioning,
        DeploymentState::Indeterminate,
        DeploymentState::Succeeded,
    ]);

    poller
        .wait_until_succeeded(&cartel, "h1", "i-01", &deadline())
        .await
        .expect("deployment should succeed");

    assert_eq!(
        cartel.count(|call| matches!(call, crate::test_support::CartelCall::GetDeploymentState(_))),
        3
    );
}

#[rstest]
#[tokio::test]
async fn fail_state_is_named(poller: DeploymentPoller, cartel: FakeCartel) {
    cartel.push_deployment_states([DeploymentState::Provisioning, DeploymentState::Failed]);

    let err = poller
        .wait_until_succeeded(&cartel, "h1", "i-01", &deadline())
        .await
        .expect_err("fail state should end the wait");

    assert_eq!(
        err,
        PollError::FailState {
            state: String::from("failed"),
            instance_id: String::from("i-01"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn timeout_names_instance(poller: DeploymentPoller, cartel: FakeCartel) {
    cartel.push_deployment_states([DeploymentState::Provisioning]);

    let err = poller
        .wait_until_succeeded(&cartel, "h1", "i-01", &Deadline::after(Duration::ZERO))
        .await
        .expect_err("deadline already passed");

    assert_eq!(
        err,
        PollError::Timeout {
            instance_id: String::from("i-01")
        }
    );
}

#[rstest]
#[tokio::test]
async fn transient_errors_keep_polling(poller: DeploymentPoller, cartel: FakeCartel) {
    cartel.push_deployment_error(CartelError::Status {
        action: String::from("deployment_status"),
        status: 502,
        message: String::from("bad gateway"),
    });
    cartel.push_deployment_states([DeploymentState::Succeeded]);

    poller
        .wait_until_succeeded(&cartel, "h1", "i-01", &deadline())
        .await
        .expect("502 should be retried");
}

#[rstest]
#[tokio::test]
async fn permanent_errors_stop_polling(poller: DeploymentPoller, cartel: FakeCartel) {
    let forbidden = CartelError::Status {
        action: String::from("deployment_status"),
        status: 403,
        message: String::from("forbidden"),
    };
    cartel.push_deployment_error(forbidden.clone());
    cartel.push_deployment_states([DeploymentState::Succeeded]);

    let err = poller
        .wait_until_succeeded(&cartel, "h1", "i-01", &deadline())
        .await
        .expect_err("403 is not retried");

    assert_eq!(err, PollError::Remote(forbidden));
}
