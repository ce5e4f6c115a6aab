mod common;

use common::{ax100_frame, corrupt, satellite, HEADER_LEN, LENGTH_FIELD_LEN};
use rand::{rngs::StdRng, Rng, SeedableRng};
use spacelab::csp::{fragment, CspCodec, CspHeader, PORT_PING};
use spacelab::framing::timing::modulate_nrz;
use spacelab::pipeline::{decode_captures, Packet, Pipeline, PipelineOpts};

fn downlink(opts: PipelineOpts) -> Pipeline {
    Pipeline::new(&satellite(), "downlink", opts).unwrap()
}

#[test]
fn frame_header_bytes() {
    let data: Vec<u8> = (1..=10).collect();
    let frame = ax100_frame(&data);
    assert_eq!(
        hex::encode(&frame[..HEADER_LEN + LENGTH_FIELD_LEN]),
        "aaaaaaaaaaaaaaaa930b51de22d02a"
    );
}

#[test]
fn corrected_frame_fed_byte_by_byte() {
    let data: Vec<u8> = (1..=10).collect();
    let mut frame = ax100_frame(&data);
    let start = HEADER_LEN + LENGTH_FIELD_LEN;
    corrupt(&mut frame, &[start + 2, start + 25], 0xFF);

    let mut pipeline = downlink(PipelineOpts::default());
    let packets: Vec<Packet> = frame.iter().filter_map(|b| pipeline.feed(*b)).collect();

    assert_eq!(packets, vec![Packet::Raw(data)]);
}

#[test]
fn frames_in_noise() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut stream = Vec::new();
    let mut expected = Vec::new();
    for len in [1usize, 17, 64, 150, 223] {
        stream.extend((0..rng.gen_range(0..100)).map(|_| rng.gen::<u8>()));
        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let mut frame = ax100_frame(&data);
        let start = HEADER_LEN + LENGTH_FIELD_LEN;
        for _ in 0..8 {
            let pos = rng.gen_range(start..frame.len());
            frame[pos] = rng.gen();
        }
        stream.extend(frame);
        expected.push(Packet::Raw(data));
    }

    let mut pipeline = downlink(PipelineOpts::default());
    assert_eq!(pipeline.decode_all(&stream), expected);
}

#[test]
fn sync_word_bit_errors() {
    let data = vec![0x42; 30];
    let mut frame = ax100_frame(&data);
    // two bit errors in the sync word
    frame[8] ^= 0x01;
    frame[10] ^= 0x80;

    let mut strict = downlink(PipelineOpts::default());
    assert!(strict.decode_all(&frame).is_empty());

    let mut tolerant = downlink(PipelineOpts::default().with_sync_max_errors(2));
    assert_eq!(tolerant.decode_all(&frame), vec![Packet::Raw(data)]);
}

#[test]
fn damaged_length_field() {
    let data = vec![0x17; 30];
    let mut frame = ax100_frame(&data);
    corrupt(&mut frame, &[HEADER_LEN], 0x0F);

    let mut strict = downlink(PipelineOpts::default());
    assert!(strict.decode_all(&frame).is_empty());

    let mut tolerant = downlink(PipelineOpts::default().with_tolerant_length(true));
    assert_eq!(tolerant.decode_all(&frame), vec![Packet::Raw(data)]);
}

#[test]
fn beacon_from_samples() {
    let sat = satellite();
    let mut pipeline = Pipeline::new(&sat, "beacon", PipelineOpts::default().with_csp_address(1))
        .unwrap();

    let ping = CspCodec::new(20).unwrap().encode_ping(1, 16).unwrap();
    let mut bytes = vec![0x00; 4];
    bytes.extend(ax100_frame(&ping));
    bytes.extend([0x00; 4]);
    let samples = modulate_nrz(&bytes, 48_000.0, 1200.0, 0.5).unwrap();

    let packets: Vec<Packet> = samples
        .chunks(1000)
        .flat_map(|chunk| pipeline.feed_samples(chunk))
        .collect();
    assert_eq!(packets.len(), 1);
    let Packet::Csp(pkt) = &packets[0] else {
        panic!("expected a CSP packet, got {:?}", packets[0]);
    };
    assert_eq!(pkt.header.src, 20);
    assert_eq!(pkt.header.dst, 1);
    assert_eq!(pkt.header.dst_port, PORT_PING);
    assert_eq!(pkt.payload, (0..16).collect::<Vec<u8>>());
}

#[test]
fn paginated_transfer() {
    let sat = satellite();
    let opts = PipelineOpts::default().with_fragment_port(30);
    let mut pipeline = Pipeline::new(&sat, "beacon", opts).unwrap();

    let codec = CspCodec::new(20).unwrap();
    let header = CspHeader::builder().dst(0).dst_port(30).src_port(40).build();
    let transfer: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();

    let mut stream = Vec::new();
    for frag in fragment(9, &transfer, 219).unwrap() {
        stream.extend(ax100_frame(&codec.encode(header, &frag).unwrap()));
    }
    let packets = pipeline.decode_all(&stream);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].payload(), transfer);
}

#[test]
fn parallel_captures() {
    let sat = satellite();
    let captures: Vec<Vec<u8>> = (0..16u8)
        .map(|i| {
            let mut capture = vec![i; usize::from(i)];
            capture.extend(ax100_frame(&[i; 32]));
            capture.extend(ax100_frame(&[i.wrapping_add(100); 5]));
            capture
        })
        .collect();

    let results = decode_captures(&sat, "downlink", &PipelineOpts::default(), &captures).unwrap();
    assert_eq!(results.len(), captures.len());
    for (i, packets) in (0..16u8).zip(results) {
        assert_eq!(
            packets,
            vec![
                Packet::Raw(vec![i; 32]),
                Packet::Raw(vec![i.wrapping_add(100); 5])
            ]
        );
    }
}
