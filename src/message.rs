use std::any::Any;
use std::fmt;

/// Payload carried between ports. Implemented automatically for every
/// 'static type that is Clone + Send + Debug, so models can send plain
/// structs, strings, numbers etc. without any ceremony.
///
/// Payloads are deep-copied when they are sent and once per receiver when
/// they are delivered: mutating a message after sending it, or mutating a
/// received message, never affects anyone else.
pub trait Msg: Any + Send + fmt::Debug
{
	fn clone_msg(&self) -> Box<dyn Msg>;
	fn as_any(&self) -> &dyn Any;
	fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T> Msg for T
	where T: Any + Clone + Send + fmt::Debug
{
	fn clone_msg(&self) -> Box<dyn Msg>
	{
		Box::new(self.clone())
	}

	fn as_any(&self) -> &dyn Any
	{
		self
	}

	fn into_any(self: Box<Self>) -> Box<dyn Any>
	{
		self
	}
}

impl dyn Msg
{
	pub fn is<T: Msg>(&self) -> bool
	{
		self.as_any().is::<T>()
	}

	pub fn downcast_ref<T: Msg>(&self) -> Option<&T>
	{
		self.as_any().downcast_ref::<T>()
	}

	pub fn downcast<T: Msg>(self: Box<Self>) -> Option<Box<T>>
	{
		self.into_any().downcast::<T>().ok()
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[derive(Clone, Debug, PartialEq)]
	struct Ping
	{
		id: u32,
	}

	#[test]
	fn downcasts_to_the_sent_type()
	{
		let m: Box<dyn Msg> = Box::new(Ping{id: 7});
		assert!(m.is::<Ping>());
		assert!(!m.is::<String>());
		assert_eq!(m.downcast_ref::<Ping>().unwrap().id, 7);
		assert_eq!(*m.downcast::<Ping>().unwrap(), Ping{id: 7});
	}

	#[test]
	fn clone_msg_is_independent()
	{
		let mut original = Ping{id: 1};
		let copy = {
			let m: &dyn Msg = &original;
			m.clone_msg()
		};
		original.id = 99;
		assert_eq!(copy.downcast_ref::<Ping>().unwrap().id, 1);
		assert_eq!(original.id, 99);
	}

	#[test]
	fn strings_are_messages()
	{
		let m: Box<dyn Msg> = Box::new("hello".to_string());
		assert_eq!(m.downcast_ref::<String>().unwrap(), "hello");
	}
}
