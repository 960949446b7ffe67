//! Reader abstraction for card communication
//!
//! A reader moves raw APDU bytes to and from a card that comes and goes from the
//! field. It knows nothing about command structure or secure channels; presence
//! changes are surfaced as [`ReaderEvent`]s and a vanished card during an exchange
//! is reported as [`TransportError::TagLost`].

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::TransportError;

/// Presence events pushed by a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A tag entered the field and is ready for exchanges
    TagConnected,
    /// The tag left the field
    TagLost,
}

/// Trait for proximity card readers
#[async_trait]
pub trait CardReader: Send + fmt::Debug {
    /// Start polling for tags
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Wait for the next presence change
    async fn next_event(&mut self) -> Result<ReaderEvent, TransportError>;

    /// Send raw APDU bytes to the card and return the raw response
    async fn transmit(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit(command).await;
        match &result {
            Ok(response) => trace!(response = %hex::encode(response), "Received raw response"),
            Err(e) => debug!(error = ?e, "Transport error during transmission"),
        }
        result
    }

    /// Internal implementation of [`transmit`](Self::transmit)
    async fn do_transmit(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Stop polling and release the underlying hardware
    fn close(&mut self);
}

#[async_trait]
impl<R: CardReader + ?Sized> CardReader for Box<R> {
    async fn open(&mut self) -> Result<(), TransportError> {
        (**self).open().await
    }

    async fn next_event(&mut self) -> Result<ReaderEvent, TransportError> {
        (**self).next_event().await
    }

    async fn transmit(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transmit(command).await
    }

    async fn do_transmit(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit(command).await
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Default)]
    struct EchoReader {
        events: VecDeque<ReaderEvent>,
        connected: bool,
        closed: bool,
    }

    #[async_trait]
    impl CardReader for EchoReader {
        async fn open(&mut self) -> Result<(), TransportError> {
            self.events.push_back(ReaderEvent::TagConnected);
            Ok(())
        }

        async fn next_event(&mut self) -> Result<ReaderEvent, TransportError> {
            let event = self.events.pop_front().ok_or(TransportError::Closed)?;
            self.connected = event == ReaderEvent::TagConnected;
            Ok(event)
        }

        async fn do_transmit(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            let mut response = command.to_vec();
            response.extend_from_slice(&[0x90, 0x00]);
            Ok(response.into())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[tokio::test]
    async fn test_boxed_reader_forwards() {
        let mut reader: Box<dyn CardReader> = Box::new(EchoReader::default());
        assert_eq!(
            reader.transmit(&[0x01]).await,
            Err(TransportError::NotConnected)
        );

        reader.open().await.unwrap();
        assert_eq!(reader.next_event().await.unwrap(), ReaderEvent::TagConnected);
        let response = reader.transmit(&[0x01, 0x02]).await.unwrap();
        assert_eq!(response.as_ref(), &[0x01, 0x02, 0x90, 0x00]);

        reader.close();
        assert_eq!(reader.next_event().await, Err(TransportError::Closed));
    }
}
