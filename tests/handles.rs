use commtrace::topology::Color;
use commtrace::{Error, SharedState};

#[test]
fn incomplete_handle() {
    let mut shared = SharedState::new(2);
    let world = shared.retrieve_world(0).unwrap();
    let handle = shared.comm_split(&world, Color::with_value(0), 0).unwrap();

    assert_eq!(Ok(false), shared.is_complete(handle));
    assert_eq!(Err(Error::NotComplete(handle)), shared.retrieve_comm(handle));
}

#[test]
fn handle_from_other_state() {
    let mut shared = SharedState::new(2);
    let mut other = SharedState::new(2);
    let world = other.retrieve_world(1).unwrap();
    let handle = other.comm_dup(&world).unwrap();

    assert_eq!(Err(Error::InvalidHandle(handle)), shared.is_complete(handle));
    assert_eq!(Err(Error::InvalidHandle(handle)), shared.retrieve_comm(handle));
}

#[test]
fn repeated_retrieval_is_stable() {
    let _ = env_logger::try_init();

    let mut shared = SharedState::new(3);
    let handles: Vec<_> = (0..3)
        .map(|rank| {
            let world = shared.retrieve_world(rank).unwrap();
            shared.comm_dup(&world).unwrap()
        })
        .collect();

    for &handle in &handles {
        let first = shared.retrieve_comm(handle).unwrap();
        let second = shared.retrieve_comm(handle).unwrap();
        assert_eq!(first, second);
    }
    // everything was collected, the construction is gone but its results are not
    assert_eq!(0, shared.live_constructions());
    for &handle in &handles {
        assert!(shared.is_complete(handle).unwrap());
        assert_eq!(3, shared.retrieve_comm(handle).unwrap().id());
    }
}
