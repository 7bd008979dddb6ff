use sparsenc::snc::{
    create_decoder, CodeFamily, DecoderKind, Field, GenerationManager, GenerationState, Packet,
    ParameterSet, Parameters,
};
use sparsenc::SncError;

fn params(symbols: usize, g: usize, b: usize, code: CodeFamily, field: Field) -> Parameters {
    Parameters::new(ParameterSet {
        data_size: symbols * 32,
        payload_size: 32,
        generation_size: g,
        band_size: b,
        code,
        field,
        seed: 21,
        ..ParameterSet::default()
    })
    .unwrap()
}

fn loaded(params: &Parameters) -> (GenerationManager, Vec<u8>) {
    let src: Vec<u8> = (0..params.data_size())
        .map(|i| (i * 31 % 251) as u8)
        .collect();
    let mut gm = GenerationManager::new(params).unwrap();
    gm.load(&src, 0).unwrap();
    (gm, src)
}

/// Builds the packet for `coefficients` over the members of `gid`.
fn combine(gm: &GenerationManager, gid: usize, coefficients: &[u8]) -> Packet {
    let field = gm.params().field();
    let mut payload = vec![0u8; gm.params().payload_size()];
    for (&sym, &c) in gm.symbols_of(gid).unwrap().iter().zip(coefficients) {
        field.mul_add_region(&mut payload, gm.symbol(sym), c);
    }
    Packet {
        gid: gid as u32,
        coefficients: coefficients.to_vec(),
        payload,
        field,
    }
}

/// Row `i` of an upper bidiagonal matrix with nonzero diagonal: full rank.
fn bidiagonal(g: usize, i: usize) -> Vec<u8> {
    let mut row = vec![0u8; g];
    row[i] = (i as u8).wrapping_mul(7) | 1;
    if i + 1 < g {
        row[i + 1] = 0x53;
    }
    row
}

#[test]
fn wire_round_trip_is_bit_exact() {
    for field in [Field::Binary, Field::Gf256] {
        let p = params(40, 13, 5, CodeFamily::Random, field);
        let (gm, _) = loaded(&p);
        let layout = p.packet_layout();
        let coefs: Vec<u8> = (0..13)
            .map(|i| if field == Field::Binary { (i % 3 == 0) as u8 } else { i as u8 * 19 })
            .collect();
        let pkt = combine(&gm, 3, &coefs);
        let raw = pkt.serialize(&layout).unwrap();
        assert_eq!(raw.len(), layout.wire_len());
        assert_eq!(&raw[..4], &[0, 0, 0, 3]);
        assert_eq!(Packet::deserialize(&raw, &layout).unwrap(), pkt);
    }
}

#[test]
fn truncated_datagram_is_malformed() {
    let p = params(40, 13, 5, CodeFamily::Random, Field::Gf256);
    let layout = p.packet_layout();
    let raw = vec![0u8; layout.wire_len() - 1];
    assert!(matches!(
        Packet::deserialize(&raw, &layout),
        Err(SncError::MalformedPacket(_))
    ));
}

#[test]
fn g_independent_packets_complete_a_generation() {
    let g = 16;
    let p = params(16, g, g, CodeFamily::Random, Field::Gf256);
    assert_eq!(p.generation_count(), 1);
    let (gm, src) = loaded(&p);
    let mut dec = create_decoder(&p, DecoderKind::Gg).unwrap();

    for i in (0..g).rev() {
        assert!(!dec.finished());
        dec.process_packet(&combine(&gm, 0, &bidiagonal(g, i))).unwrap();
    }
    assert!(dec.finished());
    assert_eq!(dec.generation_state(0).unwrap(), GenerationState::Complete);
    assert_eq!(dec.recover().unwrap(), src);
}

#[test]
fn one_generation_completes_independently_of_the_rest() {
    let g = 16;
    let p = params(64, g, g, CodeFamily::Random, Field::Gf256);
    assert_eq!(p.generation_count(), 4);
    let (gm, _) = loaded(&p);
    let mut dec = create_decoder(&p, DecoderKind::Gg).unwrap();

    for i in 0..g {
        dec.process_packet(&combine(&gm, 2, &bidiagonal(g, i))).unwrap();
    }
    assert_eq!(dec.generation_state(2).unwrap(), GenerationState::Complete);
    for gid in [0, 1, 3] {
        assert_eq!(dec.generation_state(gid).unwrap(), GenerationState::Empty);
    }
    assert!(!dec.finished());
    assert!(matches!(
        dec.recover(),
        Err(SncError::IncompleteRecovery { recovered: 16, total: 64 })
    ));
}

#[test]
fn fewer_than_g_packets_never_finish() {
    let g = 12;
    let p = params(12, g, 4, CodeFamily::Random, Field::Gf256);
    let (gm, _) = loaded(&p);
    for kind in [DecoderKind::Gg, DecoderKind::Oa, DecoderKind::Cbd] {
        let mut dec = create_decoder(&p, kind).unwrap();
        for i in 0..g - 1 {
            dec.process_packet(&combine(&gm, 0, &bidiagonal(g, i))).unwrap();
        }
        assert!(!dec.finished(), "{kind:?}");
        assert_eq!(dec.rank(), g - 1, "{kind:?}");
    }
}

#[test]
fn dependent_packet_leaves_rank_unchanged() {
    let g = 8;
    let p = params(32, g, 4, CodeFamily::Band, Field::Gf256);
    let (gm, _) = loaded(&p);
    let a = bidiagonal(g, 2);
    let b = bidiagonal(g, 5);
    let mix: Vec<u8> = a
        .iter()
        .zip(&b)
        .map(|(&x, &y)| Field::Gf256.add(Field::Gf256.mul(x, 9), Field::Gf256.mul(y, 200)))
        .collect();

    for kind in [DecoderKind::Gg, DecoderKind::Oa, DecoderKind::Bd, DecoderKind::Cbd] {
        let mut dec = create_decoder(&p, kind).unwrap();
        dec.process_packet(&combine(&gm, 1, &a)).unwrap();
        dec.process_packet(&combine(&gm, 1, &b)).unwrap();
        assert_eq!(dec.rank(), 2, "{kind:?}");

        dec.process_packet(&combine(&gm, 1, &mix)).unwrap();
        dec.process_packet(&combine(&gm, 1, &a)).unwrap();
        assert_eq!(dec.rank(), 2, "{kind:?}");
        let stats = dec.stats();
        assert_eq!(stats.received, 4, "{kind:?}");
        assert_eq!(stats.innovative, 2, "{kind:?}");
        assert_eq!(stats.non_innovative, 2, "{kind:?}");
    }
}

#[test]
fn band_generations_cover_every_symbol() {
    for (n, g, b) in [(100, 20, 8), (101, 20, 7), (64, 64, 1), (33, 5, 5), (10, 1, 1)] {
        let p = params(n, g, b, CodeFamily::Band, Field::Binary);
        let gm = GenerationManager::new(&p).unwrap();
        assert_eq!(gm.generation_count(), (n - g).div_ceil(b) + 1, "n={n} g={g} b={b}");
        assert!(gm.is_banded());

        let mut covered = vec![false; n];
        for gid in 0..gm.generation_count() {
            let syms = gm.symbols_of(gid).unwrap();
            assert_eq!(syms.len(), g);
            assert!(syms.windows(2).all(|w| w[1] == w[0] + 1));
            for &s in syms {
                covered[s] = true;
            }
        }
        assert!(covered.iter().all(|&c| c), "n={n} g={g} b={b}");
    }
}

#[test]
fn random_grouping_depends_only_on_seed() {
    let p = params(90, 20, 8, CodeFamily::Random, Field::Binary);
    let a = GenerationManager::new(&p).unwrap();
    let b = GenerationManager::new(&p).unwrap();
    for gid in 0..a.generation_count() {
        let syms = a.symbols_of(gid).unwrap();
        assert_eq!(syms, b.symbols_of(gid).unwrap());
        assert_eq!(syms.len(), 20);
        assert!(syms.windows(2).all(|w| w[0] < w[1]));
    }
    assert!(!a.is_banded());
}
