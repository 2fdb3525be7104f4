//! Delegates for one clone pass.
//!
//! The serializer side captures every host object into a
//! [`TransferableTable`]; the deserializer side rebuilds values from the same
//! table. Ids are dense indexes into the table and mean nothing outside the
//! pass that produced them.
//!
//! A view is written as its table id followed by two ordinary values, its
//! buffer and a bag of its extra own properties. The reader cannot look
//! ahead, so it reads both right after the id and binds them before
//! building the view.

use std::sync::Arc;

use super::{DeserializerDelegate, SerializerDelegate, ValueDeserializer, ValueSerializer};
use crate::array_buffer::BufferRef;
use crate::context::Context;
use crate::error::{CopyError, CopyResult};
use crate::external_copy::{
    ArrayBufferViewCopy, ExternalCopy, SharedArrayBufferCopy, Transferable,
};
use crate::shared_buffer::SharedArrayBuffer;
use crate::value::{CompiledModule, Value};

/// Host-object copies captured during one serialize pass.
#[derive(Debug, Default)]
pub struct TransferableTable {
    /// Host objects and shared buffers, by id
    pub transferables: Vec<ExternalCopy>,
    /// Compiled modules, by their own id space
    pub wasm_modules: Vec<Arc<CompiledModule>>,
    /// Ids in `transferables` that hold view copies, ascending
    pub array_buffer_view_indexes: Vec<u32>,
}

#[derive(Clone, Copy)]
struct TableMark {
    transferables: usize,
    wasm_modules: usize,
    views: usize,
}

impl TransferableTable {
    /// Whether `id` refers to a view copy
    pub fn is_view(&self, id: u32) -> bool {
        self.array_buffer_view_indexes.binary_search(&id).is_ok()
    }

    /// Bytes held by the table's copies
    pub fn size(&self) -> usize {
        self.transferables.iter().map(Transferable::size).sum()
    }

    fn mark(&self) -> TableMark {
        TableMark {
            transferables: self.transferables.len(),
            wasm_modules: self.wasm_modules.len(),
            views: self.array_buffer_view_indexes.len(),
        }
    }

    fn rollback(&mut self, mark: TableMark) {
        self.transferables.truncate(mark.transferables);
        self.wasm_modules.truncate(mark.wasm_modules);
        self.array_buffer_view_indexes.truncate(mark.views);
    }
}

/// Serializer delegate that captures host objects from the source context.
#[derive(Debug)]
pub struct CloneSerializerDelegate<'a> {
    ctx: &'a Context,
    table: TransferableTable,
}

impl<'a> CloneSerializerDelegate<'a> {
    /// Start a pass reading from `ctx`
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            table: TransferableTable::default(),
        }
    }

    /// Finish the pass and hand over the captured table
    pub fn finish(self) -> TransferableTable {
        self.table
    }

    /// Run one callback body. On failure the table is restored to what it
    /// held before the call and the error becomes a `DataCloneError`.
    fn run_barrier<T>(
        &mut self,
        callback: &'static str,
        body: impl FnOnce(&mut Self) -> CopyResult<T>,
    ) -> CopyResult<T> {
        let mark = self.table.mark();
        match body(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.table.rollback(mark);
                tracing::warn!(callback, error = %err, "clone pass callback failed");
                Err(err.into_data_clone())
            }
        }
    }
}

impl SerializerDelegate for CloneSerializerDelegate<'_> {
    fn get_shared_array_buffer_id(&mut self, buffer: &Arc<SharedArrayBuffer>) -> CopyResult<u32> {
        self.run_barrier("get_shared_array_buffer_id", |this| {
            this.table
                .transferables
                .push(ExternalCopy::SharedArrayBuffer(SharedArrayBufferCopy::new(buffer)));
            let id = (this.table.transferables.len() - 1) as u32;
            tracing::trace!(id, "shared array buffer captured");
            Ok(id)
        })
    }

    fn get_wasm_module_transfer_id(&mut self, module: &Arc<CompiledModule>) -> CopyResult<u32> {
        let id = self.table.wasm_modules.len() as u32;
        self.table.wasm_modules.push(module.clone());
        Ok(id)
    }

    fn write_host_object(&mut self, serializer: &mut ValueSerializer, value: &Value) -> CopyResult<()> {
        self.run_barrier("write_host_object", |this| {
            let id = this.table.transferables.len() as u32;
            serializer.write_uint32(id);
            match value {
                Value::ArrayBufferView(view) => {
                    let copy = ArrayBufferViewCopy::copy(view, this.ctx)?;
                    this.table
                        .transferables
                        .push(ExternalCopy::ArrayBufferView(copy));
                    this.table.array_buffer_view_indexes.push(id);
                    tracing::trace!(id, kind = view.kind().name(), "view captured");

                    serializer.write_value(&view.buffer().to_value(), this)?;
                    let properties = ArrayBufferViewCopy::copy_own_properties(view, this.ctx);
                    serializer.write_value(&Value::object(properties), this)
                }
                Value::Host(host) => {
                    let copy = host.transfer_out()?;
                    this.table.transferables.push(ExternalCopy::Host(copy));
                    tracing::trace!(id, class = host.class_name(), "host object captured");
                    Ok(())
                }
                other => Err(CopyError::UnsupportedValueKind(other.type_name())),
            }
        })
    }
}

/// Deserializer delegate that rebuilds host objects in the target context.
#[derive(Debug)]
pub struct CloneDeserializerDelegate<'a> {
    table: &'a TransferableTable,
}

impl<'a> CloneDeserializerDelegate<'a> {
    /// Start a pass over a captured table
    pub fn new(table: &'a TransferableTable) -> Self {
        Self { table }
    }

    fn transferable(&self, id: u32) -> CopyResult<&'a ExternalCopy> {
        self.table
            .transferables
            .get(id as usize)
            .ok_or_else(|| CopyError::data_clone(format!("no transferable with id {id}")))
    }

    fn run_barrier<T>(
        &mut self,
        callback: &'static str,
        body: impl FnOnce(&mut Self) -> CopyResult<T>,
    ) -> CopyResult<T> {
        body(self).map_err(|err| {
            tracing::warn!(callback, error = %err, "clone pass callback failed");
            err.into_data_clone()
        })
    }

    fn read_array_buffer_view(
        &mut self,
        deserializer: &mut ValueDeserializer<'_>,
        ctx: &Context,
        copy: &ArrayBufferViewCopy,
    ) -> CopyResult<Value> {
        let mut view = copy.unbound();
        let buffer = deserializer.read_value(ctx, self)?;
        let properties = deserializer.read_value(ctx, self)?;

        let buffer = BufferRef::from_value(&buffer)
            .ok_or_else(|| CopyError::data_clone("view buffer is not a buffer"))?;
        let properties = properties
            .as_object()
            .cloned()
            .ok_or_else(|| CopyError::data_clone("view properties are not an object"))?;
        view.set_underlying_buffer(buffer);
        view.set_own_properties(properties);
        view.transfer_in(ctx)
    }
}

impl DeserializerDelegate for CloneDeserializerDelegate<'_> {
    fn get_shared_array_buffer_from_id(&mut self, ctx: &Context, id: u32) -> CopyResult<Arc<SharedArrayBuffer>> {
        self.run_barrier("get_shared_array_buffer_from_id", |this| {
            match this.transferable(id)? {
                ExternalCopy::SharedArrayBuffer(copy) => Ok(copy.copy_into_buffer(ctx)),
                _ => Err(CopyError::data_clone(format!(
                    "transferable {id} is not a shared array buffer"
                ))),
            }
        })
    }

    fn get_wasm_module_from_id(&mut self, id: u32) -> CopyResult<Arc<CompiledModule>> {
        self.run_barrier("get_wasm_module_from_id", |this| {
            this.table
                .wasm_modules
                .get(id as usize)
                .cloned()
                .ok_or_else(|| CopyError::data_clone(format!("no compiled module with id {id}")))
        })
    }

    fn read_host_object(&mut self, deserializer: &mut ValueDeserializer<'_>, ctx: &Context) -> CopyResult<Value> {
        self.run_barrier("read_host_object", |this| {
            let id = deserializer.read_uint32()?;
            let copy = this.transferable(id)?;
            tracing::trace!(id, "reading host object");
            if this.table.is_view(id) {
                let ExternalCopy::ArrayBufferView(view) = copy else {
                    return Err(CopyError::data_clone(format!(
                        "transferable {id} is not a view"
                    )));
                };
                this.read_array_buffer_view(deserializer, ctx, view)
            } else {
                copy.transfer_in(ctx)
            }
        })
    }
}
