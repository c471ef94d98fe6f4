//! Outgoing sends to foreign receivers.
//!
//! A guest message sent to a value owned by another runtime is mapped onto
//! that runtime's message protocol. The mapping depends on the method name
//! and the shape of the arguments, so every site caches the branch it chose
//! for each name it has seen.

use std::sync::Arc;

use crate::{
    Arity, CacheLimits, DispatchSite, ForeignObject, GuardChain, InteropError,
    PrimitiveKind, RaiseException, RuntimeShared, Value, dispatch,
};

pub const INDEX_READ: &str = "[]";
pub const CALL: &str = "call";
pub const NEW: &str = "new";
pub const SEND: &str = "__send__";

/// The protocol message a guest send is translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutgoingCall {
    /// `[]` with one basic integer.
    ReadArrayElement,
    /// `[]` with one symbol or string.
    ReadMember,
    Execute,
    Instantiate,
    /// `__send__` with a message name: re-dispatched as a guest send.
    Send,
    /// Name not starting with a letter: unbox and re-dispatch.
    Operator,
    /// `name=` with exactly one argument.
    WriteMember,
    /// `name=` with any other argument count.
    WriteMemberArity,
    /// No arguments: invoke if invocable, otherwise read.
    ReadOrInvoke,
    InvokeMember,
}

impl OutgoingCall {
    /// Chooses the branch for a send. Checked in order; the first match
    /// wins.
    pub fn classify(name: &str, args: &[Value]) -> Self {
        if name == INDEX_READ && args.len() == 1 {
            match &args[0] {
                Value::Fixnum(_) => return OutgoingCall::ReadArrayElement,
                Value::Symbol(_) => return OutgoingCall::ReadMember,
                value if value.as_str().is_some() => {
                    return OutgoingCall::ReadMember;
                }
                _ => {}
            }
        }
        if name == CALL {
            OutgoingCall::Execute
        } else if name == NEW {
            OutgoingCall::Instantiate
        } else if name == SEND && !args.is_empty() {
            OutgoingCall::Send
        } else if is_operator(name) {
            OutgoingCall::Operator
        } else if name.ends_with('=') {
            if args.len() == 1 {
                OutgoingCall::WriteMember
            } else {
                OutgoingCall::WriteMemberArity
            }
        } else if args.is_empty() {
            OutgoingCall::ReadOrInvoke
        } else {
            OutgoingCall::InvokeMember
        }
    }
}

#[inline]
pub fn is_operator(name: &str) -> bool {
    name.chars().next().is_some_and(|c| !c.is_alphabetic())
}

struct ForeignBranch {
    name: Arc<str>,
    call: OutgoingCall,
    member: Arc<str>,
    send: Option<DispatchSite>,
    operator: Option<OperatorSite>,
}

impl ForeignBranch {
    fn with_sites(
        name: &str,
        call: OutgoingCall,
        send: Option<DispatchSite>,
        operator: Option<OperatorSite>,
    ) -> Self {
        let member = match call {
            OutgoingCall::WriteMember => name.trim_end_matches('='),
            _ => name,
        };
        Self {
            name: Arc::from(name),
            call,
            member: Arc::from(member),
            send,
            operator,
        }
    }

    fn new(limits: &CacheLimits, name: &str, call: OutgoingCall) -> Self {
        Self::with_sites(
            name,
            call,
            (call == OutgoingCall::Send).then(|| DispatchSite::new(limits)),
            (call == OutgoingCall::Operator).then(|| OperatorSite::new(limits)),
        )
    }

    /// A one-shot branch for megamorphic sites; nested sends go uncached.
    fn uncached(name: &str, call: OutgoingCall) -> Self {
        Self::with_sites(name, call, None, None)
    }

    #[inline]
    fn guard(&self, name: &str, args: &[Value]) -> bool {
        &*self.name == name && OutgoingCall::classify(name, args) == self.call
    }

    fn execute(
        &self,
        runtime: &RuntimeShared,
        receiver: &Arc<dyn ForeignObject>,
        args: &[Value],
    ) -> Result<Value, RaiseException> {
        let translate = |err: InteropError| runtime.exceptions().from_interop(&err);
        match self.call {
            OutgoingCall::ReadArrayElement => {
                let index = args[0].as_fixnum().unwrap_or_default();
                receiver.read_array_element(index).map_err(translate)
            }
            OutgoingCall::ReadMember => {
                let key = runtime.name_to_string(&args[0])?;
                receiver.read_member(&key).map_err(translate)
            }
            OutgoingCall::Execute => receiver.execute(args).map_err(translate),
            OutgoingCall::Instantiate => {
                receiver.instantiate(args).map_err(translate)
            }
            OutgoingCall::Send => {
                let message = runtime.name_to_string(&args[0])?;
                let receiver = Value::Foreign(receiver.clone());
                match &self.send {
                    Some(site) => site.call(runtime, &receiver, &message, &args[1..]),
                    None => dispatch::call_uncached(
                        runtime,
                        &receiver,
                        &message,
                        &args[1..],
                    ),
                }
            }
            OutgoingCall::Operator => match &self.operator {
                Some(site) => site.call(runtime, receiver, &self.name, args),
                None => {
                    let kind = PrimitiveKind::of(receiver.as_ref());
                    OperatorBranch::unbox_and_send(
                        runtime, None, kind, receiver, &self.name, args,
                    )
                }
            },
            OutgoingCall::WriteMember => {
                receiver
                    .write_member(&self.member, args[0].clone())
                    .map_err(translate)?;
                Ok(args[0].clone())
            }
            OutgoingCall::WriteMemberArity => Err(runtime
                .exceptions()
                .argument_error(args.len(), Arity::Exact(1))),
            OutgoingCall::ReadOrInvoke => {
                if receiver.is_member_invocable(&self.member) {
                    receiver.invoke_member(&self.member, &[]).map_err(translate)
                } else {
                    receiver.read_member(&self.member).map_err(translate)
                }
            }
            OutgoingCall::InvokeMember => {
                receiver.invoke_member(&self.member, args).map_err(translate)
            }
        }
    }
}

/// Per-site cache of foreign send branches, keyed by name and argument
/// shape. Past the dispatch limit every send is classified afresh.
pub struct ForeignCallSite {
    limits: CacheLimits,
    branches: GuardChain<Arc<ForeignBranch>>,
}

impl ForeignCallSite {
    pub fn new(limits: &CacheLimits) -> Self {
        Self {
            limits: *limits,
            branches: GuardChain::new("foreign dispatch", limits.dispatch_cache),
        }
    }

    pub fn call(
        &self,
        runtime: &RuntimeShared,
        receiver: &Arc<dyn ForeignObject>,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RaiseException> {
        let hit = self
            .branches
            .find_map(|branch| branch.guard(name, args).then(|| branch.clone()));
        if let Some(branch) = hit {
            return branch.execute(runtime, receiver, args);
        }
        let call = OutgoingCall::classify(name, args);
        if self.branches.is_megamorphic() {
            return ForeignBranch::uncached(name, call).execute(runtime, receiver, args);
        }
        let branch = Arc::new(ForeignBranch::new(&self.limits, name, call));
        log::trace!("foreign send '{name}' cached as {call:?}");
        self.branches.install(branch.clone(), |a, b| {
            a.name == b.name && a.call == b.call
        });
        branch.execute(runtime, receiver, args)
    }

    pub fn cached_branches(&self) -> Vec<(Arc<str>, OutgoingCall)> {
        let mut out = Vec::new();
        self.branches
            .for_each(|branch| out.push((branch.name.clone(), branch.call)));
        out
    }

    pub fn is_megamorphic(&self) -> bool {
        self.branches.is_megamorphic()
    }
}

/// Foreign send with no owning site.
pub fn call_foreign_uncached(
    runtime: &RuntimeShared,
    receiver: &Arc<dyn ForeignObject>,
    name: &str,
    args: &[Value],
) -> Result<Value, RaiseException> {
    let call = OutgoingCall::classify(name, args);
    ForeignBranch::uncached(name, call).execute(runtime, receiver, args)
}

struct OperatorBranch {
    kind: PrimitiveKind,
    site: DispatchSite,
}

impl OperatorBranch {
    /// Converts the receiver to the guest primitive of `kind` and sends
    /// `name` to it. Receivers of no primitive kind get the message as a
    /// member invocation instead.
    fn unbox_and_send(
        runtime: &RuntimeShared,
        site: Option<&DispatchSite>,
        kind: PrimitiveKind,
        receiver: &Arc<dyn ForeignObject>,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RaiseException> {
        let translate = |err: InteropError| runtime.exceptions().from_interop(&err);
        let unboxed = match kind {
            PrimitiveKind::Boolean => {
                Value::Bool(receiver.as_boolean().map_err(translate)?)
            }
            PrimitiveKind::String => {
                runtime.new_string(&receiver.as_string().map_err(translate)?)
            }
            PrimitiveKind::Int => {
                Value::Fixnum(receiver.as_int().map_err(translate)? as i64)
            }
            PrimitiveKind::Long => {
                Value::Fixnum(receiver.as_long().map_err(translate)?)
            }
            PrimitiveKind::Double => {
                Value::Float(receiver.as_double().map_err(translate)?)
            }
            PrimitiveKind::Other => {
                return receiver.invoke_member(name, args).map_err(translate);
            }
        };
        match site {
            Some(site) => site.call(runtime, &unboxed, name, args),
            None => dispatch::call_uncached(runtime, &unboxed, name, args),
        }
    }
}

/// Inner cache of the operator branch, keyed by the receiver's primitive
/// kind.
struct OperatorSite {
    limits: CacheLimits,
    kinds: GuardChain<Arc<OperatorBranch>>,
}

impl OperatorSite {
    fn new(limits: &CacheLimits) -> Self {
        Self {
            limits: *limits,
            kinds: GuardChain::new("foreign operator", limits.method_lookup_cache),
        }
    }

    fn call(
        &self,
        runtime: &RuntimeShared,
        receiver: &Arc<dyn ForeignObject>,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RaiseException> {
        let kind = PrimitiveKind::of(receiver.as_ref());
        let hit = self
            .kinds
            .find_map(|branch| (branch.kind == kind).then(|| branch.clone()));
        let branch = match hit {
            Some(branch) => branch,
            None if self.kinds.is_megamorphic() => {
                return OperatorBranch::unbox_and_send(
                    runtime, None, kind, receiver, name, args,
                );
            }
            None => {
                let branch = Arc::new(OperatorBranch {
                    kind,
                    site: DispatchSite::new(&self.limits),
                });
                self.kinds.install(branch.clone(), |a, b| a.kind == b.kind);
                branch
            }
        };
        OperatorBranch::unbox_and_send(
            runtime,
            Some(&branch.site),
            branch.kind,
            receiver,
            name,
            args,
        )
    }
}
