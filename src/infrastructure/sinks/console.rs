//! Human-readable one-line-per-event sink.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::application::events::AuditEvent;
use crate::application::ports::AuditSink;
use crate::domain::SinkError;

pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    fn format(event: &AuditEvent<'_>) -> String {
        let request = event.request();
        let mut line = format!(
            "{} [{}] {} call_id={} sender={}",
            event.timestamp().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            event.direction(),
            event.operation().name,
            request.call_id,
            request.sender,
        );
        if let AuditEvent::Response { context, .. } = event {
            line.push_str(&format!(
                " outcome={} runtime_ms={}",
                context.envelope.outcome().as_str(),
                context.runtime.as_millis()
            ));
            if let Some(fault) = context.envelope.as_fault() {
                line.push_str(&format!(" fault={} description={:?}", fault.code, fault.description));
            }
        }
        line.push('\n');
        line
    }
}

impl AuditSink for ConsoleSink {
    fn record(&self, event: &AuditEvent<'_>) -> Result<(), SinkError> {
        let line = Self::format(event);
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::application::events::{OperationInfo, TagSet};
    use crate::domain::{Fault, FaultCode, RequestContext, ResponseContext, ResultEnvelope};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn one_line_per_event() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(buf.clone());
        let info = OperationInfo {
            name: "AuthorizeRemoteStop".into(),
            tags: TagSet::from_iter(["remote-stop"]),
        };
        let request = RequestContext::new("DE*GDF".into(), json!({"SessionID": "s-1"}));

        sink.record(&AuditEvent::Request {
            operation: &info,
            context: &request,
        })
        .unwrap();

        let response = ResponseContext {
            request,
            envelope: ResultEnvelope::<serde_json::Value>::Fault(Fault::new(
                FaultCode::UpstreamFault,
                "EVSE offline",
            )),
            runtime: Duration::from_millis(42),
        };
        sink.record(&AuditEvent::Response {
            operation: &info,
            context: &response,
        })
        .unwrap();

        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[request] AuthorizeRemoteStop"));
        assert!(lines[0].contains("sender=DE*GDF"));
        assert!(lines[1].contains("[response]"));
        assert!(lines[1].contains("outcome=fault runtime_ms=42"));
        assert!(lines[1].contains("fault=UpstreamFault"));
    }
}
