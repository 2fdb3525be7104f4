//! End-to-end transfers between two contexts
//!
//! Every test copies out of a `source` context and materializes into a
//! separate `target` context.

use num_bigint::BigInt;
use num_traits::One;
use otter_external_copy::external_copy::{ErrorType, Transferable};
use otter_external_copy::object::{PropertyAttributes, PropertyDescriptor};
use otter_external_copy::value::{CompiledModule, HostObject};
use otter_external_copy::{
    BufferRef, Context, ContextConfig, CopyError, CopyOptions, ExternalCopy, JsArrayBuffer,
    JsArrayBufferView, JsObject, LimitedAllocator, PropertyKey, SharedArrayBuffer, Value,
    ViewKind,
};
use std::sync::Arc;

fn contexts() -> (Context, Context) {
    (Context::default(), Context::default())
}

fn transfer(value: &Value, options: &CopyOptions) -> Value {
    let (source, target) = contexts();
    let copy = ExternalCopy::copy(value, &source, options).unwrap();
    copy.copy_into(&target, true).unwrap()
}

fn view_over(buffer: BufferRef, kind: ViewKind, offset: usize, len: usize) -> Arc<JsArrayBufferView> {
    let object = Arc::new(JsObject::with_class_name(kind.name(), None));
    Arc::new(JsArrayBufferView::new(object, buffer, kind, offset, len).unwrap())
}

fn prop(value: &Value, key: &str) -> Value {
    value
        .as_object()
        .unwrap()
        .get(&PropertyKey::string(key))
        .unwrap_or(Value::Undefined)
}

#[test]
fn test_numbers_keep_exact_bits() {
    for n in [
        0.0,
        -0.0,
        f64::NAN,
        f64::INFINITY,
        f64::NEG_INFINITY,
        1e300,
        -2.5,
        4_294_967_295.0,
        -2_147_483_648.0,
    ] {
        let out = transfer(&Value::number(n), &CopyOptions::new());
        assert_eq!(out.as_number().unwrap().to_bits(), n.to_bits(), "{n}");
    }
}

#[test]
fn test_small_integers_stay_small() {
    assert!(matches!(
        transfer(&Value::int32(-12), &CopyOptions::new()),
        Value::Int32(-12)
    ));
    assert!(matches!(
        transfer(&Value::int32(12), &CopyOptions::new()),
        Value::Int32(12)
    ));
}

#[test]
fn test_bigints_keep_sign_and_words() {
    let huge = (BigInt::one() << 512u32) - BigInt::one();
    for n in [huge.clone(), -huge, BigInt::from(0), BigInt::from(-7)] {
        let out = transfer(&Value::bigint(n.clone()), &CopyOptions::new());
        assert_eq!(out.as_bigint(), Some(&n));
    }
}

#[test]
fn test_other_primitives() {
    for value in [
        Value::undefined(),
        Value::null(),
        Value::boolean(false),
        Value::string(""),
        Value::string("emoji 🦦"),
    ] {
        assert_eq!(transfer(&value, &CopyOptions::new()), value);
    }
}

#[test]
fn test_primitive_copies_materialize_repeatedly() {
    let (source, target) = contexts();
    let copy = ExternalCopy::copy(&Value::string("again"), &source, &CopyOptions::new()).unwrap();
    for _ in 0..3 {
        assert_eq!(copy.copy_into(&target, true).unwrap(), Value::string("again"));
    }
}

#[test]
fn test_error_subtypes_survive() {
    let target = Context::default();
    for name in ["Error", "RangeError", "ReferenceError", "SyntaxError", "TypeError"] {
        let error = JsObject::with_class_name(name, None);
        error.define_property(
            PropertyKey::string("message"),
            PropertyDescriptor::data_with_attrs(Value::string("went wrong"), PropertyAttributes::hidden()),
        );
        error.define_property(
            PropertyKey::string("stack"),
            PropertyDescriptor::data_with_attrs(
                Value::string(format!("{name}: went wrong\n    at main")),
                PropertyAttributes::hidden(),
            ),
        );

        let copy = ExternalCopy::copy_thrown_value(&Value::object(Arc::new(error)));
        let ExternalCopy::Error(captured) = &copy else {
            panic!("{name} was not captured as an error");
        };
        assert_eq!(captured.error_type().constructor_name(), name);

        let out = copy.copy_into(&target, false).unwrap();
        assert_eq!(out.as_object().unwrap().class_name(), name);
        assert_eq!(prop(&out, "message"), Value::string("went wrong"));
        assert_eq!(
            prop(&out, "stack"),
            Value::string(format!("{name}: went wrong\n    at main"))
        );
    }
}

#[test]
fn test_error_without_stack_has_none() {
    let target = Context::default();
    let error = JsObject::with_class_name("TypeError", None);
    error.set(PropertyKey::string("message"), Value::string("no stack"));
    let copy = ExternalCopy::copy_thrown_value(&Value::object(Arc::new(error)));
    let out = copy.copy_into(&target, false).unwrap();
    assert!(!out.as_object().unwrap().has_own(&PropertyKey::string("stack")));
}

#[test]
fn test_custom_error_from_getter_message() {
    let error = JsObject::with_class_name("HttpError", None);
    error.define_property(
        PropertyKey::string("message"),
        PropertyDescriptor::getter(|| Ok(Value::string("404"))),
    );
    error.set(PropertyKey::string("name"), Value::string("HttpError"));
    let copy = ExternalCopy::copy_thrown_value(&Value::object(Arc::new(error)));
    let ExternalCopy::Error(captured) = &copy else {
        panic!("custom error was not captured");
    };
    assert_eq!(captured.error_type(), ErrorType::CustomError);
    assert_eq!(captured.message(), "404");
    assert_eq!(captured.name(), Some("HttpError"));
}

#[test]
fn test_transferred_buffer_detaches_source() {
    let (source, target) = contexts();
    let bytes: Vec<u8> = (0..16).collect();
    let buffer = Arc::new(JsArrayBuffer::from_bytes(&bytes));

    let copy = ExternalCopy::copy(&Value::array_buffer(buffer.clone()), &source, &CopyOptions::transfer())
        .unwrap();
    assert!(buffer.is_detached());
    assert_eq!(buffer.byte_length(), 0);

    let out = copy.copy_into(&target, true).unwrap();
    assert_eq!(out.as_array_buffer().unwrap().to_vec(), Some(bytes));

    assert_eq!(
        ExternalCopy::copy(&Value::array_buffer(buffer), &source, &CopyOptions::new()).unwrap_err(),
        CopyError::BufferInvalid
    );
}

#[test]
fn test_consumed_buffer_copy_fails_both_modes() {
    let (source, target) = contexts();
    let buffer = Arc::new(JsArrayBuffer::from_bytes(&[1, 2, 3]));
    let copy = ExternalCopy::copy(&Value::array_buffer(buffer), &source, &CopyOptions::new()).unwrap();
    copy.copy_into(&target, true).unwrap();
    assert_eq!(copy.copy_into(&target, true).unwrap_err(), CopyError::BufferInvalid);
    assert_eq!(copy.copy_into(&target, false).unwrap_err(), CopyError::BufferInvalid);
}

#[test]
fn test_duplicates_are_independent() {
    let (source, target) = contexts();
    let buffer = Arc::new(JsArrayBuffer::from_bytes(&[8, 9]));
    let a = ExternalCopy::copy(&Value::array_buffer(buffer.clone()), &source, &CopyOptions::new()).unwrap();
    let b = ExternalCopy::copy(&Value::array_buffer(buffer.clone()), &source, &CopyOptions::new()).unwrap();
    buffer.set(0, 0);

    let out_a = a.copy_into(&target, false).unwrap();
    let out_b = b.copy_into(&target, false).unwrap();
    let out_a = out_a.as_array_buffer().unwrap();
    let out_b = out_b.as_array_buffer().unwrap();
    assert_eq!(out_a.to_vec(), Some(vec![8, 9]));
    assert_eq!(out_b.to_vec(), Some(vec![8, 9]));
    out_a.set(1, 1);
    assert_eq!(out_b.get(1), Some(9));
}

#[test]
fn test_copy_in_checks_target_limit() {
    let source = Context::default();
    let target = Context::new(ContextConfig::new().array_buffer_limit(8));
    let buffer = Arc::new(JsArrayBuffer::new(32));
    let copy = ExternalCopy::copy(&Value::array_buffer(buffer), &source, &CopyOptions::new()).unwrap();
    let err = copy.copy_into(&target, false).unwrap_err();
    assert_eq!(err, CopyError::AllocationLimitExceeded { requested: 32 });
    assert_eq!(err.to_string(), "RangeError: Array buffer allocation failed");
}

#[test]
fn test_transfer_in_past_limit_fails_heap_check() {
    let source = Context::default();
    let target = Context::new(ContextConfig::new().array_buffer_limit(8));
    let buffer = Arc::new(JsArrayBuffer::new(32));
    let copy = ExternalCopy::copy(&Value::array_buffer(buffer), &source, &CopyOptions::transfer()).unwrap();
    assert!(matches!(
        copy.copy_into_check_heap(&target, true),
        Err(CopyError::AllocationLimitExceeded { .. })
    ));
}

#[test]
fn test_dropped_copies_return_target_budget() {
    let source = Context::default();
    let target = Context::new(ContextConfig::new().array_buffer_limit(8));
    let buffer = Arc::new(JsArrayBuffer::from_bytes(&[1, 2, 3, 4]));
    let copy = ExternalCopy::copy(&Value::array_buffer(buffer), &source, &CopyOptions::new()).unwrap();
    for _ in 0..5 {
        let out = copy.copy_into(&target, false).unwrap();
        assert_eq!(out.as_array_buffer().unwrap().byte_length(), 4);
    }
}

#[test]
fn test_transfer_out_returns_source_budget() {
    let guard = Arc::new(LimitedAllocator::new(8));
    let source = Context::default().with_allocator(guard.clone());
    let buffer = source.new_array_buffer(&[9; 8]);
    assert_eq!(guard.allocated(), 8);

    let copy = ExternalCopy::copy(&Value::array_buffer(buffer.clone()), &source, &CopyOptions::transfer())
        .unwrap();
    assert_eq!(guard.allocated(), 0);
    assert!(buffer.is_detached());
    drop(copy);
    assert_eq!(guard.allocated(), 0);
}

#[test]
fn test_repeated_transfer_list_entry_keeps_source() {
    let (source, _) = contexts();
    let buffer = Arc::new(JsArrayBuffer::from_bytes(&[1, 2, 3]));
    let object = Arc::new(JsObject::new(None));
    object.set(PropertyKey::string("data"), Value::array_buffer(buffer.clone()));
    let options = CopyOptions::new()
        .with_transfer(buffer.clone())
        .with_transfer(buffer.clone());

    let err = ExternalCopy::copy(&Value::object(object), &source, &options).unwrap_err();
    assert!(err.is_data_clone());
    assert!(!buffer.is_detached());
    assert_eq!(buffer.to_vec(), Some(vec![1, 2, 3]));
}

#[test]
fn test_object_with_view_scenario() {
    let object = Arc::new(JsObject::new(None));
    object.set(PropertyKey::string("a"), Value::int32(1));
    object.set(PropertyKey::string("b"), Value::string("x"));
    let view = Arc::new(JsArrayBufferView::from_bytes(ViewKind::Uint8, &[1, 2, 3]).unwrap());
    object.set(PropertyKey::string("c"), Value::array_buffer_view(view));
    let other = Arc::new(JsArrayBufferView::from_bytes(ViewKind::Uint8, &[4, 5, 6]).unwrap());
    object.set(PropertyKey::string("d"), Value::array_buffer_view(other));

    let out = transfer(&Value::object(object), &CopyOptions::new());
    assert_eq!(prop(&out, "a"), Value::int32(1));
    assert_eq!(prop(&out, "b"), Value::string("x"));

    let c = prop(&out, "c");
    let c = c.as_array_buffer_view().unwrap();
    assert_eq!(c.kind(), ViewKind::Uint8);
    assert_eq!(c.byte_length(), 3);
    assert_eq!(c.to_vec(), Some(vec![1, 2, 3]));

    let d = prop(&out, "d");
    let d = d.as_array_buffer_view().unwrap();
    assert!(!Arc::ptr_eq(
        &c.buffer().backing_store().unwrap(),
        &d.buffer().backing_store().unwrap()
    ));
}

#[test]
fn test_view_range_and_custom_properties() {
    let bytes: Vec<u8> = (10..26).collect();
    let buffer = BufferRef::Array(Arc::new(JsArrayBuffer::from_bytes(&bytes)));
    let view = view_over(buffer, ViewKind::Int16, 4, 6);
    view.object.set(PropertyKey::string("custom"), Value::string("field"));
    view.object.define_property(
        PropertyKey::string("hidden"),
        PropertyDescriptor::data_with_attrs(Value::int32(3), PropertyAttributes::hidden()),
    );

    let out = transfer(&Value::array_buffer_view(view), &CopyOptions::new());
    let out = out.as_array_buffer_view().unwrap();
    assert_eq!(out.kind(), ViewKind::Int16);
    assert_eq!(out.byte_offset(), 4);
    assert_eq!(out.length(), 3);
    assert_eq!(out.to_vec(), Some(bytes[4..10].to_vec()));
    assert_eq!(
        out.object.get(&PropertyKey::string("custom")),
        Some(Value::string("field"))
    );
    assert_eq!(
        out.object.get(&PropertyKey::string("hidden")),
        Some(Value::int32(3))
    );
}

#[test]
fn test_every_view_kind_round_trips() {
    for kind in ViewKind::ALL {
        let len = kind.element_size() * 2;
        let bytes: Vec<u8> = (0..len as u8).collect();
        let view = Arc::new(JsArrayBufferView::from_bytes(kind, &bytes).unwrap());
        let out = transfer(&Value::array_buffer_view(view), &CopyOptions::new());
        let out = out.as_array_buffer_view().unwrap();
        assert_eq!(out.kind(), kind);
        assert_eq!(out.to_vec(), Some(bytes));
        assert_eq!(out.object.class_name(), kind.name());
    }
}

#[test]
fn test_view_with_transfer_moves_its_buffer() {
    let buffer = Arc::new(JsArrayBuffer::from_bytes(&[7; 8]));
    let view = view_over(BufferRef::Array(buffer.clone()), ViewKind::Uint8, 2, 4);

    let out = transfer(&Value::array_buffer_view(view), &CopyOptions::transfer());
    assert!(buffer.is_detached());
    let out = out.as_array_buffer_view().unwrap();
    assert_eq!(out.to_vec(), Some(vec![7; 4]));
    let BufferRef::Array(target_buffer) = out.buffer() else {
        panic!("expected an ArrayBuffer");
    };
    assert_eq!(target_buffer.byte_length(), 8);
}

#[test]
fn test_views_sharing_a_buffer_share_it_after_transfer() {
    let buffer = BufferRef::Array(Arc::new(JsArrayBuffer::from_bytes(&[1, 2, 3, 4])));
    let pair = Arc::new(JsObject::array(2));
    pair.set(
        PropertyKey::Index(0),
        Value::array_buffer_view(view_over(buffer.clone(), ViewKind::Uint8, 0, 2)),
    );
    pair.set(
        PropertyKey::Index(1),
        Value::array_buffer_view(view_over(buffer, ViewKind::Uint8, 2, 2)),
    );

    let out = transfer(&Value::array(pair), &CopyOptions::new());
    let out = out.as_object().unwrap();
    let first = out.get(&PropertyKey::Index(0)).unwrap();
    let second = out.get(&PropertyKey::Index(1)).unwrap();
    let first = first.as_array_buffer_view().unwrap();
    let second = second.as_array_buffer_view().unwrap();
    assert!(Arc::ptr_eq(
        &first.buffer().backing_store().unwrap(),
        &second.buffer().backing_store().unwrap()
    ));
    assert_eq!(second.to_vec(), Some(vec![3, 4]));
}

#[test]
fn test_shared_buffer_identity_in_one_pass() {
    let sab = Arc::new(SharedArrayBuffer::new(8));
    let pair = Arc::new(JsObject::array(2));
    pair.set(
        PropertyKey::Index(0),
        Value::array_buffer_view(view_over(BufferRef::Shared(sab.clone()), ViewKind::Uint8, 0, 4)),
    );
    pair.set(
        PropertyKey::Index(1),
        Value::array_buffer_view(view_over(BufferRef::Shared(sab.clone()), ViewKind::Uint32, 4, 4)),
    );

    let out = transfer(&Value::array(pair), &CopyOptions::new());
    let out = out.as_object().unwrap();
    let first = out.get(&PropertyKey::Index(0)).unwrap();
    let second = out.get(&PropertyKey::Index(1)).unwrap();
    let first = first.as_array_buffer_view().unwrap();
    let second = second.as_array_buffer_view().unwrap();

    let store = sab.backing_store();
    assert!(Arc::ptr_eq(&first.buffer().backing_store().unwrap(), store));
    assert!(Arc::ptr_eq(&second.buffer().backing_store().unwrap(), store));

    first.set(0, 42.0);
    assert_eq!(sab.get(0), Some(42));
}

#[test]
fn test_top_level_shared_buffer_is_shared() {
    let (source, target) = contexts();
    let sab = Arc::new(SharedArrayBuffer::new(4));
    let copy = ExternalCopy::copy(&Value::shared_array_buffer(sab.clone()), &source, &CopyOptions::transfer())
        .unwrap();
    let a = copy.copy_into(&target, true).unwrap();
    let b = copy.copy_into(&target, true).unwrap();
    assert!(a.as_shared_array_buffer().unwrap().shares_memory_with(&sab));
    assert!(b.as_shared_array_buffer().unwrap().shares_memory_with(&sab));
}

#[test]
fn test_node_buffer_prototype_is_restored() {
    let source = Context::new(ContextConfig::new().node_buffer_prototype(true));
    let target = Context::new(ContextConfig::new().node_buffer_prototype(true));

    let view = JsArrayBufferView::from_bytes(ViewKind::Uint8, &[1, 2]).unwrap();
    view.object.set_prototype(source.buffer_prototype());
    let copy = ExternalCopy::copy(&Value::array_buffer_view(Arc::new(view)), &source, &CopyOptions::new())
        .unwrap();

    let out = copy.copy_into(&target, false).unwrap();
    let out = out.as_array_buffer_view().unwrap();
    assert!(Arc::ptr_eq(
        &out.object.prototype().unwrap(),
        &target.buffer_prototype().unwrap()
    ));

    let plain = Context::default();
    let out = copy.copy_into(&plain, false).unwrap();
    assert!(out.as_array_buffer_view().unwrap().object.prototype().is_none());
}

#[test]
fn test_transfer_list_inside_graph() {
    let (source, target) = contexts();
    let moved = Arc::new(JsArrayBuffer::from_bytes(&[1, 1]));
    let kept = Arc::new(JsArrayBuffer::from_bytes(&[2, 2]));
    let object = Arc::new(JsObject::new(None));
    object.set(PropertyKey::string("moved"), Value::array_buffer(moved.clone()));
    object.set(PropertyKey::string("kept"), Value::array_buffer(kept.clone()));

    let options = CopyOptions::new().with_transfer(moved.clone());
    let copy = ExternalCopy::copy(&Value::object(object), &source, &options).unwrap();
    assert!(moved.is_detached());
    assert!(!kept.is_detached());

    let out = copy.copy_into(&target, true).unwrap();
    assert_eq!(
        prop(&out, "moved").as_array_buffer().unwrap().to_vec(),
        Some(vec![1, 1])
    );
    assert_eq!(
        prop(&out, "kept").as_array_buffer().unwrap().to_vec(),
        Some(vec![2, 2])
    );
}

#[test]
fn test_unclonable_members_fail_whole_copy() {
    let source = Context::default();
    let object = Arc::new(JsObject::new(None));
    object.set(PropertyKey::string("ok"), Value::int32(1));
    object.set(PropertyKey::string("sym"), Value::Symbol(9));
    let err = ExternalCopy::copy(&Value::object(object), &source, &CopyOptions::new()).unwrap_err();
    assert!(err.is_data_clone());
}

#[test]
fn test_lazy_view_respects_source_limit() {
    let source = Context::new(ContextConfig::new().array_buffer_limit(16));
    let lazy = Arc::new(JsArrayBuffer::lazy(64));
    let view = view_over(BufferRef::Array(lazy.clone()), ViewKind::Float64, 0, 64);
    assert_eq!(
        ExternalCopy::copy(&Value::array_buffer_view(view), &source, &CopyOptions::new()).unwrap_err(),
        CopyError::AllocationLimitExceeded { requested: 64 }
    );
    assert!(!lazy.has_buffer());
}

#[test]
fn test_concurrent_duplicate_and_transfer() {
    let buffer = Arc::new(JsArrayBuffer::from_bytes(&[5; 1024]));
    let mut handles = Vec::new();
    for i in 0..8 {
        let buffer = buffer.clone();
        handles.push(std::thread::spawn(move || {
            let ctx = Context::default();
            let options = if i == 0 { CopyOptions::transfer() } else { CopyOptions::new() };
            match ExternalCopy::copy(&Value::array_buffer(buffer), &ctx, &options) {
                Ok(copy) => {
                    let out = copy.copy_into(&ctx, false).unwrap();
                    assert_eq!(out.as_array_buffer().unwrap().to_vec(), Some(vec![5; 1024]));
                }
                Err(err) => assert_eq!(err, CopyError::BufferInvalid),
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(buffer.is_detached());
}

/// A higher-layer handle that re-materializes a string it captured.
#[derive(Debug)]
struct Greeting(&'static str);

#[derive(Debug)]
struct GreetingCopy(ExternalCopy);

impl Transferable for GreetingCopy {
    fn copy_into(&self, ctx: &Context, transfer_in: bool) -> otter_external_copy::CopyResult<Value> {
        self.0.copy_into(ctx, transfer_in)
    }

    fn size(&self) -> usize {
        self.0.size()
    }
}

impl HostObject for Greeting {
    fn class_name(&self) -> &str {
        "Greeting"
    }

    fn transfer_out(&self) -> otter_external_copy::CopyResult<Box<dyn Transferable>> {
        let copy = ExternalCopy::copy_if_primitive(&Value::string(self.0))
            .ok_or(CopyError::UnsupportedValueKind("greeting"))?;
        Ok(Box::new(GreetingCopy(copy)))
    }
}

#[test]
fn test_host_objects_travel_in_graph() {
    let object = Arc::new(JsObject::new(None));
    object.set(PropertyKey::string("greeting"), Value::Host(Arc::new(Greeting("hello"))));
    let out = transfer(&Value::object(object), &CopyOptions::new());
    assert_eq!(prop(&out, "greeting"), Value::string("hello"));
}

#[test]
fn test_compiled_modules_are_shared() {
    let module = Arc::new(CompiledModule::new("adder", b"\0asm\x01\0\0\0"));
    let list = Arc::new(JsObject::array(1));
    list.set(PropertyKey::Index(0), Value::WasmModule(module.clone()));
    let out = transfer(&Value::array(list), &CopyOptions::new());
    let restored = out.as_object().unwrap().get(&PropertyKey::Index(0)).unwrap();
    assert!(Arc::ptr_eq(restored.as_wasm_module().unwrap(), &module));
}
