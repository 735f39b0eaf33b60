//! Response path: reply → wire bytes → socket.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::ConnectionFault;
use crate::metrics;
use crate::protocol::{self, Response};

/// Write one response line and flush it. `scratch` is reused between calls.
pub async fn send_response<W>(
    writer: &mut W,
    scratch: &mut Vec<u8>,
    response: &Response,
) -> Result<(), ConnectionFault>
where
    W: AsyncWrite + Unpin,
{
    scratch.clear();
    protocol::write_response(scratch, response);

    let written = async {
        writer.write_all(scratch).await?;
        writer.flush().await
    }
    .await;

    match written {
        Ok(()) => {
            metrics::inc_responses_sent();
            Ok(())
        }
        Err(err) => {
            metrics::inc_write_faults();
            Err(ConnectionFault::Write(err))
        }
    }
}
