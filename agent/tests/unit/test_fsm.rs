//! FSM unit tests

use updater_agent::deploy::fsm::{UpdateEvent, UpdateFsm, UpdateState};

#[test]
fn test_fsm_initial_state() {
    let fsm = UpdateFsm::new();
    assert_eq!(fsm.state(), UpdateState::Idle);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.history(), &[UpdateState::Idle]);
}

#[test]
fn test_fsm_full_pipeline() {
    let mut fsm = UpdateFsm::new();

    for event in [
        UpdateEvent::Stop,
        UpdateEvent::Backup,
        UpdateEvent::Clear,
        UpdateEvent::Extract,
        UpdateEvent::Start,
        UpdateEvent::Finish,
    ] {
        fsm.process(event).unwrap();
    }

    assert_eq!(
        fsm.history(),
        &[
            UpdateState::Idle,
            UpdateState::Stopping,
            UpdateState::BackingUp,
            UpdateState::Clearing,
            UpdateState::Extracting,
            UpdateState::Starting,
            UpdateState::Done,
        ]
    );
}

#[test]
fn test_fsm_backup_is_optional() {
    let mut fsm = UpdateFsm::new();

    // Stopping -> Clearing
    fsm.process(UpdateEvent::Stop).unwrap();
    fsm.process(UpdateEvent::Clear).unwrap();
    assert_eq!(fsm.state(), UpdateState::Clearing);
}

#[test]
fn test_fsm_cannot_skip_steps() {
    let mut fsm = UpdateFsm::new();
    assert!(fsm.process(UpdateEvent::Clear).is_err());
    assert!(fsm.process(UpdateEvent::Extract).is_err());
    assert_eq!(fsm.state(), UpdateState::Idle);

    fsm.process(UpdateEvent::Stop).unwrap();
    assert!(fsm.process(UpdateEvent::Extract).is_err());
    assert!(fsm.process(UpdateEvent::Start).is_err());
}

#[test]
fn test_fsm_failure_from_every_step() {
    let steps = [
        vec![],
        vec![UpdateEvent::Stop],
        vec![UpdateEvent::Stop, UpdateEvent::Backup],
        vec![UpdateEvent::Stop, UpdateEvent::Clear],
        vec![UpdateEvent::Stop, UpdateEvent::Clear, UpdateEvent::Extract],
        vec![UpdateEvent::Stop, UpdateEvent::Clear, UpdateEvent::Extract, UpdateEvent::Start],
    ];

    for prefix in steps {
        let mut fsm = UpdateFsm::new();
        for event in prefix {
            fsm.process(event).unwrap();
        }
        fsm.process(UpdateEvent::Fail("boom".to_string())).unwrap();
        assert_eq!(fsm.state(), UpdateState::Failed);
        assert_eq!(fsm.error(), Some("boom"));

        // Terminal
        assert!(fsm.process(UpdateEvent::Stop).is_err());
    }
}

#[test]
fn test_fsm_done_is_terminal() {
    let mut fsm = UpdateFsm::new();
    for event in [
        UpdateEvent::Stop,
        UpdateEvent::Clear,
        UpdateEvent::Extract,
        UpdateEvent::Start,
        UpdateEvent::Finish,
    ] {
        fsm.process(event).unwrap();
    }
    assert!(fsm.process(UpdateEvent::Fail("late".to_string())).is_err());
    assert_eq!(fsm.state(), UpdateState::Done);
}
