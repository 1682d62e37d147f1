mod data_log;
mod receiver;
mod sender;

pub use self::{
    data_log::DataLog,
    receiver::{PlaybackSlot, Receiver},
    sender::Sender,
};
