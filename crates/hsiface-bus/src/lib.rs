//! Message-bus transports for the three HitSpool channel shapes: Alert
//! (HTTP request/reply), Fan-out (WebSocket broadcast), and Report
//! (WebSocket push/pull). The server sides run a hello/heartbeat/select
//! loop; the client sides run a connect/send/recv session against it.

pub mod alert;
pub mod fanout;
pub mod report;
