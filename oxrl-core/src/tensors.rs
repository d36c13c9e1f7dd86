// Newtypes to keep the handful of scalar loss tensors in the update loop from
// getting mixed up.
use candle_core::Tensor;
use derive_more::{Deref, DerefMut};

#[derive(Deref, DerefMut, Debug)]
pub struct PolicyLoss(pub Tensor);

#[derive(Deref, DerefMut, Debug)]
pub struct ValueLoss(pub Tensor);

#[derive(Deref, DerefMut, Debug)]
pub struct EntropyLoss(pub Tensor);
