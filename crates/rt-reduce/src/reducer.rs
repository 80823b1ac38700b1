//! Type erasure for the user's combine function and terminal callback.
//! The reduction state machine itself only ever shuffles `Vec<u8>` around
//! (tree shape and arrival order don't care what's inside); the type the
//! caller contributed is recovered exactly once, at the two points that
//! actually need it: combining two values, and delivering the final one.

use rt_types::Payload;

pub(crate) trait ErasedReducer: Send {
    fn combine(&self, a: Vec<u8>, b: Vec<u8>) -> Vec<u8>;
    fn finish(self: Box<Self>, bytes: Vec<u8>);
}

pub(crate) struct TypedReducer<T, F, C> {
    pub(crate) combine_fn: F,
    pub(crate) callback: Option<C>,
    pub(crate) _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, F, C> ErasedReducer for TypedReducer<T, F, C>
where
    T: Payload,
    F: Fn(T, T) -> T + Send,
    C: FnOnce(T) + Send,
{
    fn combine(&self, a: Vec<u8>, b: Vec<u8>) -> Vec<u8> {
        let ta = T::unpack(&a).expect("reduction contribution decode");
        let tb = T::unpack(&b).expect("reduction contribution decode");
        (self.combine_fn)(ta, tb).pack().expect("reduction result encode")
    }

    fn finish(self: Box<Self>, bytes: Vec<u8>) {
        if let Some(callback) = self.callback {
            let value = T::unpack(&bytes).expect("reduction result decode");
            callback(value);
        }
    }
}
