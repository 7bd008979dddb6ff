use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref PACKETS_GENERATED: IntCounter =
        register_int_counter!("snc_packets_generated_total", "Number of coded packets generated").unwrap();
    pub static ref PACKETS_PROCESSED: IntCounter =
        register_int_counter!("snc_packets_processed_total", "Number of packets handed to a decoder").unwrap();
    pub static ref PACKETS_NON_INNOVATIVE: IntCounter = register_int_counter!(
        "snc_packets_non_innovative_total",
        "Number of packets that did not raise decoder rank"
    )
    .unwrap();
    pub static ref PACKETS_MALFORMED: IntCounter =
        register_int_counter!("snc_packets_malformed_total", "Number of packets rejected as malformed").unwrap();
    pub static ref PACKETS_RECODED: IntCounter =
        register_int_counter!("snc_packets_recoded_total", "Number of packets produced by recoders").unwrap();
    pub static ref GENERATIONS_COMPLETED: IntCounter =
        register_int_counter!("snc_generations_completed_total", "Number of generations fully decoded").unwrap();
    pub static ref SEGMENTS_RECOVERED: IntCounter =
        register_int_counter!("snc_segments_recovered_total", "Number of chunk segments recovered").unwrap();
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
