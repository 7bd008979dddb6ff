use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sparsenc::snc::{
    create_decoder, create_session, CodeFamily, DecoderKind, Field, Packet, ParameterSet,
    RecodeSchedule, Recoder,
};

fn source(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

fn sixty_four_kb(field: Field) -> ParameterSet {
    ParameterSet {
        data_size: 65536,
        payload_size: 1280,
        generation_size: 48,
        code: CodeFamily::Random,
        field,
        seed: 1,
        ..ParameterSet::default()
    }
}

#[test]
fn sixty_four_kb_random_code_with_gg() {
    for field in [Field::Binary, Field::Gf256] {
        let src = source(65536, 10);
        let mut session = create_session(sixty_four_kb(field)).unwrap();
        session.load_source(&src, 0).unwrap();
        let params = session.params().clone();
        let layout = params.packet_layout();
        let budget = params.redundancy_budget();
        assert_eq!(params.symbol_count(), 52);

        let mut dec = create_decoder(&params, DecoderKind::Gg).unwrap();
        let mut sent = 0;
        while !dec.finished() {
            assert!(sent < 2 * budget, "{field:?}: {sent} packets, budget {budget}");
            let raw = session.generate_packet().serialize(&layout).unwrap();
            dec.process_packet(&Packet::deserialize(&raw, &layout).unwrap())
                .unwrap();
            sent += 1;
        }
        assert_eq!(dec.recover().unwrap(), src);
        assert!(dec.overhead() >= 1.0);
    }
}

#[test]
fn loss_and_reordering_are_tolerated() {
    let set = ParameterSet {
        data_size: 30_000,
        payload_size: 100,
        generation_size: 20,
        band_size: 10,
        field: Field::Gf256,
        seed: 4,
        ..ParameterSet::default()
    };
    for (code, kind) in [
        (CodeFamily::Random, DecoderKind::Gg),
        (CodeFamily::Random, DecoderKind::Oa),
        (CodeFamily::Band, DecoderKind::Bd),
        (CodeFamily::Band, DecoderKind::Cbd),
        (CodeFamily::WindWrap, DecoderKind::Gg),
    ] {
        let src = source(30_000, 11);
        let mut session = create_session(ParameterSet { code, ..set.clone() }).unwrap();
        session.load_source(&src, 0).unwrap();
        let params = session.params().clone();
        let mut dec = create_decoder(&params, kind).unwrap();
        let mut channel = StdRng::seed_from_u64(99);

        let mut rounds = 0;
        while !dec.finished() {
            rounds += 1;
            assert!(rounds < 100, "{code:?}/{kind:?} stalled");
            let mut batch: Vec<Packet> = (0..64).map(|_| session.generate_packet()).collect();
            batch.retain(|_| !channel.gen_bool(0.2));
            batch.shuffle(&mut channel);
            for pkt in &batch {
                dec.process_packet(pkt).unwrap();
            }
        }
        assert_eq!(dec.recover().unwrap(), src, "{code:?}/{kind:?}");
    }
}

#[test]
fn band_decoder_never_finishes_a_random_stream() {
    let src = source(20_000, 3);
    let mut session = create_session(ParameterSet {
        data_size: 20_000,
        payload_size: 100,
        generation_size: 16,
        band_size: 8,
        code: CodeFamily::Random,
        field: Field::Gf256,
        ..ParameterSet::default()
    })
    .unwrap();
    session.load_source(&src, 0).unwrap();
    let params = session.params().clone();
    assert!(!session.generations().is_banded());

    let mut dec = create_decoder(&params, DecoderKind::Bd).unwrap();
    let sent = 5 * params.redundancy_budget();
    for _ in 0..sent {
        dec.process_packet(&session.generate_packet()).unwrap();
    }
    assert!(!dec.finished());
    assert_eq!(dec.stats().discarded, sent as u64);
    assert!(dec.recover().is_err());
}

#[test]
fn recoded_stream_decodes() {
    let src = source(12_000, 8);
    let mut session = create_session(ParameterSet {
        data_size: 12_000,
        payload_size: 200,
        generation_size: 12,
        band_size: 6,
        field: Field::Gf256,
        seed: 2,
        ..ParameterSet::default()
    })
    .unwrap();
    session.load_source(&src, 0).unwrap();
    let params = session.params().clone();

    for schedule in [RecodeSchedule::Random, RecodeSchedule::Mlpi, RecodeSchedule::Trivial] {
        let mut relay = Recoder::with_seed(&params, 12, 5).unwrap();
        let mut dec = create_decoder(&params, DecoderKind::Gg).unwrap();
        let mut rounds = 0;
        while !dec.finished() {
            rounds += 1;
            assert!(rounds < 20 * params.redundancy_budget(), "{schedule:?} stalled");
            relay.buffer_packet(&session.generate_packet()).unwrap();
            if let Some(pkt) = relay.recode_packet(schedule) {
                dec.process_packet(&pkt).unwrap();
            }
        }
        assert_eq!(dec.recover().unwrap(), src, "{schedule:?}");
    }
}
