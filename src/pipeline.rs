//! Bytes or samples in, packets out.
//!
//! A [Pipeline] owns every piece of per-stream state for one link of one satellite: timing
//! recovery, the sync register and byte assembler, the link codec and the CSP reassembly
//! buffer. Feed it from a single thread; run one pipeline per stream for concurrency.
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver};
use derive_more::From;
use rayon::prelude::*;
use tracing::{debug, trace_span, warn};

use crate::config::{LinkProtocol, NetworkProtocol, Satellite};
use crate::csp::{CspCodec, CspPacket, HmacKey, Reassembler};
use crate::framing::{
    Ax100Mode5, BitDecoder, BitEvent, BitOrder, LinkCodec, SyncPattern, TimingRecovery,
};
use crate::prelude::*;

/// Tuning for a [Pipeline]. Link parameters come from the satellite configuration.
#[derive(Debug, Clone)]
pub struct PipelineOpts {
    sync_max_errors: usize,
    bit_order: BitOrder,
    max_frame_bytes: usize,
    tolerant_length: bool,
    csp_address: u8,
    hmac_key: Option<HmacKey>,
    fragment_port: Option<u8>,
    sample_rate: f64,
    num_threads: usize,
    buffer_size: usize,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        PipelineOpts {
            sync_max_errors: 0,
            bit_order: BitOrder::Msb,
            max_frame_bytes: BitDecoder::DEFAULT_MAX_BYTES,
            tolerant_length: false,
            csp_address: 0,
            hmac_key: None,
            fragment_port: None,
            sample_rate: 48_000.0,
            num_threads: 0,
            buffer_size: 1024,
        }
    }
}

impl PipelineOpts {
    /// Number of bit errors tolerated when matching the sync word.
    #[must_use]
    pub fn with_sync_max_errors(mut self, max_errors: usize) -> Self {
        self.sync_max_errors = max_errors;
        self
    }

    /// Bit order of the sync word and frame bytes on the air.
    #[must_use]
    pub fn with_bit_order(mut self, order: BitOrder) -> Self {
        self.bit_order = order;
        self
    }

    /// Byte count after a sync match at which the frame is abandoned.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max_bytes: usize) -> Self {
        self.max_frame_bytes = max_bytes;
        self
    }

    /// See [Ax100Mode5::with_tolerant_length].
    #[must_use]
    pub fn with_tolerant_length(mut self, enabled: bool) -> Self {
        self.tolerant_length = enabled;
        self
    }

    /// CSP address of this ground station.
    #[must_use]
    pub fn with_csp_address(mut self, address: u8) -> Self {
        self.csp_address = address;
        self
    }

    /// Shared secret used to verify CSP HMAC tags.
    #[must_use]
    pub fn with_hmac_key(mut self, secret: &str) -> Self {
        self.hmac_key = Some(HmacKey::new(secret));
        self
    }

    /// CSP destination port whose packets carry fragments of a paginated transfer.
    #[must_use]
    pub fn with_fragment_port(mut self, port: u8) -> Self {
        self.fragment_port = Some(port);
        self
    }

    /// Sample rate, in Hz, of samples passed to [Pipeline::feed_samples].
    #[must_use]
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Size of the thread pool used by [decode_captures]. By default the value will be chosen
    /// automatically.
    #[must_use]
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Number of packets [Pipeline::spawn] may queue before the pipeline thread blocks.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum Packet {
    /// Link frame payload of a link without a network protocol.
    Raw(Vec<u8>),
    Csp(CspPacket),
}

impl Packet {
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Packet::Raw(dat) => dat,
            Packet::Csp(pkt) => &pkt.payload,
        }
    }
}

/// Decoder for a single stream on one link.
///
/// # Example
/// ```
/// use spacelab::config::Satellite;
/// use spacelab::framing::Ax100Mode5;
/// use spacelab::pipeline::{Packet, Pipeline, PipelineOpts};
///
/// let sat = Satellite::from_json(r#"{
///   "name": "demo",
///   "links": [{
///     "id": "down", "name": "Downlink", "direction": "down", "frequency": 437000000,
///     "modulation": "GFSK", "baudrate": 1200, "preamble": [170, 170, 170, 170],
///     "sync_word": [147, 11, 81, 222], "protocol_link": "AX100-Mode5", "protocol_network": ""
///   }]
/// }"#).unwrap();
/// let mut pipeline = Pipeline::new(&sat, "down", PipelineOpts::default()).unwrap();
///
/// let frame = Ax100Mode5::new().encode(b"hello").unwrap();
/// let packets = pipeline.decode_all(&frame);
/// assert_eq!(packets, vec![Packet::Raw(b"hello".to_vec())]);
/// ```
pub struct Pipeline {
    satellite: String,
    link: String,
    bits: BitDecoder,
    timing: TimingRecovery<f64>,
    codec: Box<dyn LinkCodec>,
    csp: Option<CspCodec>,
    fragment_port: Option<u8>,
    reassembler: Reassembler,
    buffer_size: usize,
}

impl Pipeline {
    /// Create a pipeline for link `link_id` of `satellite` using the built-in codec for the
    /// link protocol.
    ///
    /// # Errors
    /// [Error::Config] if the link does not exist or its protocol has no built-in codec, or
    /// any error from building the sync pattern, timing recovery or CSP codec.
    pub fn new(satellite: &Satellite, link_id: &str, opts: PipelineOpts) -> Result<Self> {
        let link = satellite
            .link(link_id)
            .ok_or_else(|| Error::Config(format!("{} has no link {link_id}", satellite.name)))?;
        let codec: Box<dyn LinkCodec> = match &link.protocol_link {
            LinkProtocol::Ax100Mode5 => Box::new(
                Ax100Mode5::new()
                    .with_preamble(&link.preamble)
                    .with_sync_word(&link.sync_word)
                    .with_tolerant_length(opts.tolerant_length),
            ),
            other => {
                return Err(Error::Config(format!(
                    "link {link_id} uses {other}, which needs a codec from Pipeline::with_link_codec"
                )))
            }
        };
        Self::with_link_codec(satellite, link_id, opts, codec)
    }

    /// Create a pipeline for link `link_id` of `satellite` decoding frames with `codec`.
    ///
    /// # Errors
    /// [Error::Config] if the link does not exist, or any error from building the sync
    /// pattern, timing recovery or CSP codec.
    pub fn with_link_codec(
        satellite: &Satellite,
        link_id: &str,
        opts: PipelineOpts,
        codec: Box<dyn LinkCodec>,
    ) -> Result<Self> {
        let link = satellite
            .link(link_id)
            .ok_or_else(|| Error::Config(format!("{} has no link {link_id}", satellite.name)))?;

        let pattern = SyncPattern::new(&link.sync_word, opts.bit_order)?
            .with_max_errors(opts.sync_max_errors)?;
        let bits = BitDecoder::new(pattern)
            .with_byte_order(opts.bit_order)
            .with_max_bytes(opts.max_frame_bytes);
        let timing = TimingRecovery::new(opts.sample_rate, f64::from(link.baudrate))?;

        let csp = match link.protocol_network {
            NetworkProtocol::Csp => {
                let mut csp = CspCodec::new(opts.csp_address)?;
                if let Some(key) = opts.hmac_key {
                    csp = csp.with_hmac_key(key);
                }
                Some(csp)
            }
            _ => None,
        };

        debug!(satellite = %satellite.name, link = %link.id, protocol = %link.protocol_link, "created pipeline");

        Ok(Pipeline {
            satellite: satellite.name.clone(),
            link: link.id.clone(),
            bits,
            timing,
            codec,
            csp,
            fragment_port: opts.fragment_port,
            reassembler: Reassembler::new(),
            buffer_size: opts.buffer_size,
        })
    }

    #[must_use]
    pub fn satellite(&self) -> &str {
        &self.satellite
    }

    #[must_use]
    pub fn link(&self) -> &str {
        &self.link
    }

    fn dropped(&self, err: &Error) {
        warn!(satellite = %self.satellite, link = %self.link, error = %err, "dropped frame");
    }

    fn handle_frame(&mut self, frame: Vec<u8>) -> Option<Packet> {
        let _span = trace_span!("frame", link = %self.link, len = frame.len()).entered();

        let Some(csp) = &self.csp else {
            return Some(Packet::Raw(frame));
        };
        let pkt = match csp.decode(&frame) {
            Ok(pkt) => pkt,
            Err(err) => {
                self.dropped(&err);
                return None;
            }
        };

        if self.fragment_port != Some(pkt.header.dst_port) {
            return Some(pkt.into());
        }
        match self.reassembler.push(&pkt.payload) {
            Ok(Some(payload)) => Some(
                CspPacket {
                    header: pkt.header,
                    payload,
                }
                .into(),
            ),
            Ok(None) => None,
            Err(err) => {
                warn!(satellite = %self.satellite, link = %self.link, error = %err, "dropped transfer");
                None
            }
        }
    }

    /// Feed one bit of the demodulated stream.
    pub fn feed_bit(&mut self, bit: bool) -> Option<Packet> {
        match self.bits.push(bit) {
            Ok(None) => None,
            Ok(Some(BitEvent::Sync)) => {
                self.codec.reset();
                None
            }
            Ok(Some(BitEvent::Byte(byte))) => match self.codec.decode_byte(byte) {
                Ok(None) => None,
                Ok(Some(frame)) => {
                    self.bits.reset();
                    self.handle_frame(frame)
                }
                Err(err) => {
                    self.bits.reset();
                    self.dropped(&err);
                    None
                }
            },
            Err(err) => {
                self.codec.reset();
                self.dropped(&err);
                None
            }
        }
    }

    /// Feed one byte of the raw bit stream, most-significant bit first.
    pub fn feed(&mut self, byte: u8) -> Option<Packet> {
        let mut packet = None;
        for bit in BitOrder::Msb.bits(byte) {
            if let Some(pkt) = self.feed_bit(bit) {
                packet = Some(pkt);
            }
        }
        packet
    }

    /// Feed the next chunk of baseband samples.
    pub fn feed_samples(&mut self, samples: &[f64]) -> Vec<Packet> {
        let bits = self.timing.recover(samples);
        bits.into_iter().filter_map(|bit| self.feed_bit(bit)).collect()
    }

    /// Feed every byte of `dat`, collecting the packets produced.
    pub fn decode_all(&mut self, dat: &[u8]) -> Vec<Packet> {
        dat.iter().filter_map(|byte| self.feed(*byte)).collect()
    }

    /// Drop all stream state, including any partial frame or transfer.
    pub fn reset(&mut self) {
        self.bits.reset();
        self.timing.reset();
        self.codec.reset();
        self.reassembler.reset();
    }

    /// Run the pipeline on a background thread, decoding each chunk of raw stream bytes
    /// received from `input`.
    ///
    /// The thread exits when `input` is disconnected or the returned receiver is dropped.
    ///
    /// # Errors
    /// [Error::Io] if the thread could not be started.
    pub fn spawn(mut self, input: Receiver<Vec<u8>>) -> Result<(Receiver<Packet>, JoinHandle<()>)> {
        let (tx, rx) = bounded(self.buffer_size);
        let handle = thread::Builder::new()
            .name(format!("pipeline::{}", self.link))
            .spawn(move || {
                for chunk in input {
                    for packet in self.decode_all(&chunk) {
                        if tx.send(packet).is_err() {
                            debug!(link = %self.link, "packet receiver dropped");
                            return;
                        }
                    }
                }
                debug!(link = %self.link, "pipeline thread exit");
            })?;
        Ok((rx, handle))
    }
}

/// Decode independent captures of the same link in parallel, one fresh [Pipeline] per
/// capture. The result for each capture is at the same index as the capture.
///
/// # Errors
/// Any error from [Pipeline::new], or [Error::InvalidParameter] if the thread pool could not
/// be created.
pub fn decode_captures(
    satellite: &Satellite,
    link_id: &str,
    opts: &PipelineOpts,
    captures: &[Vec<u8>],
) -> Result<Vec<Vec<Packet>>> {
    // fail on bad configuration before starting any work
    Pipeline::new(satellite, link_id, opts.clone())?;

    let pool = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("pipeline::capture{i}"))
        .num_threads(opts.num_threads)
        .build()
        .map_err(|err| Error::InvalidParameter(format!("thread pool: {err}")))?;

    pool.install(|| {
        captures
            .par_iter()
            .map(|capture| -> Result<Vec<Packet>> {
                let mut pipeline = Pipeline::new(satellite, link_id, opts.clone())?;
                Ok(pipeline.decode_all(capture))
            })
            .collect()
    })
}
