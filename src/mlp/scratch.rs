use crate::mlp::{CLASS_COUNT, HIDDEN_LEN, INPUT_LEN};

/// Pre-allocated buffers for one forward pass, reused across requests.
/// `E` is the quantized element type, `A` the accumulator type.
#[derive(Clone)]
pub struct Scratch<E, A> {
    pub input_q: [E; INPUT_LEN],
    pub hidden_acc: [A; HIDDEN_LEN],
    pub hidden: [f32; HIDDEN_LEN],
    pub hidden_q: [E; HIDDEN_LEN],
    pub output_acc: [A; CLASS_COUNT],
    pub output: [f32; CLASS_COUNT],
}

impl<E: Copy + Default, A: Copy + Default> Scratch<E, A> {
    pub fn new() -> Self {
        Self {
            input_q: [E::default(); INPUT_LEN],
            hidden_acc: [A::default(); HIDDEN_LEN],
            hidden: [0.0; HIDDEN_LEN],
            hidden_q: [E::default(); HIDDEN_LEN],
            output_acc: [A::default(); CLASS_COUNT],
            output: [0.0; CLASS_COUNT],
        }
    }
}

impl<E: Copy + Default, A: Copy + Default> Default for Scratch<E, A> {
    fn default() -> Self { Self::new() }
}
