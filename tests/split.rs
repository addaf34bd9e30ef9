use commtrace::topology::{Color, Communicator, Rank};
use commtrace::SharedState;

const COLORS: [i32; 10] = [0, 1, 4, 4, 4, 1, 0, 1, 1, 0];
const KEYS: [i32; 10] = [9, 8, 7, 6, 5, 4, 3, 2, 1, 0];

fn split(shared: &mut SharedState, colors: &[i32], keys: &[i32]) -> Vec<Communicator> {
    let handles: Vec<_> = (0..colors.len())
        .map(|index| {
            let rank = index as Rank;
            let world = shared.retrieve_world(rank).unwrap();
            shared
                .comm_split(&world, Color::from_raw(colors[index]), keys[index])
                .unwrap()
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| shared.retrieve_comm(handle).unwrap())
        .collect()
}

#[test]
fn split_by_color_and_key() {
    let _ = env_logger::try_init();

    let mut shared = SharedState::new(10);
    let comms = split(&mut shared, &COLORS, &KEYS);

    let mut ids: Vec<_> = comms.iter().map(Communicator::id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(vec![3, 4, 5], ids);

    // ascending key within each color
    assert_eq!(&[9, 6, 0], comms[0].group().peers());
    assert_eq!(&[8, 7, 5, 1], comms[1].group().peers());
    assert_eq!(&[4, 3, 2], comms[2].group().peers());

    // ids follow ascending color order
    assert_eq!(3, comms[9].id());
    assert_eq!(4, comms[8].id());
    assert_eq!(5, comms[4].id());

    let local = |rank: usize| comms[rank].rank().unwrap();
    assert_eq!((0, 1, 2), (local(9), local(6), local(0)));
    assert_eq!((0, 1, 2, 3), (local(8), local(7), local(5), local(1)));
    assert_eq!((0, 1, 2), (local(4), local(3), local(2)));

    for (rank, comm) in comms.iter().enumerate() {
        assert_eq!(Some(rank as Rank), comm.global_rank());
    }
}

#[test]
fn equal_keys_keep_global_rank_order() {
    let mut shared = SharedState::new(5);
    let comms = split(&mut shared, &[2, 1, 2, 1, 2], &[0; 5]);
    assert_eq!(&[0, 2, 4], comms[4].group().peers());
    assert_eq!(&[1, 3], comms[1].group().peers());
}

#[test]
fn undefined_color() {
    let mut shared = SharedState::new(4);
    let undefined = Color::undefined().value();
    let comms = split(&mut shared, &[undefined, 0, -32766, 0], &[0; 4]);

    assert!(comms[0].is_null());
    assert!(comms[2].is_null());
    assert_eq!(3, comms[1].id());
    assert_eq!(&[1, 3], comms[3].group().peers());

    // only one id out of the reserved block was handed out, the next construction starts after it
    let world = shared.retrieve_world(0).unwrap();
    let comm = shared.comm_split(&world, Color::with_value(0), 0).unwrap();
    for rank in 1..4 {
        let world = shared.retrieve_world(rank).unwrap();
        shared.comm_split(&world, Color::with_value(0), 0).unwrap();
    }
    assert_eq!(7, shared.retrieve_comm(comm).unwrap().id());
}
