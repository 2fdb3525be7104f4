//! Copy of an arbitrary object graph, held as codec bytes plus the host
//! objects captured alongside them.

use std::sync::Arc;

use super::Transferable;
use super::buffer::ArrayBufferCopy;
use super::size::SizedCopy;
use crate::array_buffer::JsArrayBuffer;
use crate::context::Context;
use crate::error::{CopyError, CopyResult};
use crate::serializer::{
    CloneDeserializerDelegate, CloneSerializerDelegate, TransferableTable, ValueDeserializer,
    ValueSerializer,
};
use crate::value::Value;

/// Serialized object graph
#[derive(Debug)]
pub struct SerializedCopy {
    size: SizedCopy,
    data: Box<[u8]>,
    table: TransferableTable,
    /// Transferred buffers, indexed by transfer id
    array_buffers: Vec<ArrayBufferCopy>,
}

impl SerializedCopy {
    /// Serialize `value`, moving every buffer in `transfer_list` out of the
    /// source.
    ///
    /// Either every listed buffer is detached or, on failure, none is.
    pub fn new(value: &Value, ctx: &Context, transfer_list: &[Arc<JsArrayBuffer>]) -> CopyResult<Self> {
        for (i, buffer) in transfer_list.iter().enumerate() {
            if transfer_list[..i].iter().any(|other| Arc::ptr_eq(other, buffer)) {
                return Err(CopyError::data_clone(
                    "An ArrayBuffer is duplicated in the transfer list.",
                ));
            }
            if buffer.is_detached() {
                return Err(CopyError::data_clone(
                    "An ArrayBuffer in the transfer list is already detached.",
                ));
            }
        }

        let mut serializer = ValueSerializer::new();
        serializer.write_header();
        for (id, buffer) in transfer_list.iter().enumerate() {
            serializer.transfer_array_buffer(id as u32, buffer);
        }
        let mut delegate = CloneSerializerDelegate::new(ctx);
        serializer.write_value(value, &mut delegate)?;
        let table = delegate.finish();

        let array_buffers = transfer_all(transfer_list)?;

        let data = serializer.release().into_boxed_slice();
        tracing::debug!(
            bytes = data.len(),
            transferables = table.transferables.len(),
            transferred = array_buffers.len(),
            "value graph serialized"
        );
        Ok(Self {
            size: SizedCopy::new(std::mem::size_of::<Self>() + data.len()),
            data,
            table,
            array_buffers,
        })
    }

    /// The codec bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Host objects captured with the graph
    pub fn table(&self) -> &TransferableTable {
        &self.table
    }

    /// Number of buffers moved with the graph
    pub fn transferred_buffers(&self) -> usize {
        self.array_buffers.len()
    }
}

/// Detach every buffer in `list`, putting back the stores already taken if
/// any one of them fails.
fn transfer_all(list: &[Arc<JsArrayBuffer>]) -> CopyResult<Vec<ArrayBufferCopy>> {
    let mut stores = Vec::with_capacity(list.len());
    for buffer in list {
        match buffer.take_backing_store() {
            Ok(store) => stores.push(store),
            Err(err) => {
                for (taken, store) in list.iter().zip(stores) {
                    taken.restore_backing_store(store);
                }
                return Err(err);
            }
        }
    }
    Ok(list
        .iter()
        .zip(stores)
        .map(|(buffer, store)| {
            buffer.release_allocation();
            ArrayBufferCopy::from_store(store)
        })
        .collect())
}

impl Transferable for SerializedCopy {
    fn copy_into(&self, ctx: &Context, transfer_in: bool) -> CopyResult<Value> {
        let buffers = self
            .array_buffers
            .iter()
            .map(|copy| copy.copy_into_buffer(ctx, transfer_in))
            .collect::<CopyResult<Vec<_>>>()?;

        let mut deserializer = ValueDeserializer::new(&self.data);
        deserializer.read_header()?;
        for (id, buffer) in buffers.into_iter().enumerate() {
            deserializer.transfer_array_buffer(id as u32, buffer);
        }
        let mut delegate = CloneDeserializerDelegate::new(&self.table);
        let value = deserializer.read_value(ctx, &mut delegate)?;
        tracing::debug!(context = ctx.id(), bytes = self.data.len(), "value graph materialized");
        Ok(value)
    }

    fn size(&self) -> usize {
        self.size.size()
            + self.table.size()
            + self.array_buffers.iter().map(Transferable::size).sum::<usize>()
    }
}
