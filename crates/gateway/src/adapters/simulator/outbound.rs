use matrix_core::{RequestId, RequestKind, RequestParams};

/// One call the scheduler made on the session
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send {
        request_id: RequestId,
        params: RequestParams,
    },
    Cancel {
        kind: RequestKind,
        request_id: RequestId,
    },
}

impl Outbound {
    pub fn request_id(&self) -> RequestId {
        match self {
            Outbound::Send { request_id, .. } | Outbound::Cancel { request_id, .. } => *request_id,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Outbound::Send { params, .. } => params.kind(),
            Outbound::Cancel { kind, .. } => *kind,
        }
    }

    pub fn is_send(&self) -> bool {
        matches!(self, Outbound::Send { .. })
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, Outbound::Cancel { .. })
    }
}
