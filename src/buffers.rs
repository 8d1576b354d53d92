/*
 * Buffer Lifecycle Module
 *
 * ManagedBuffer owns one GPU buffer from allocation to release:
 * - allocate: reserves exactly count * stride bytes
 * - upload: one full replace of the contents
 * - bind: attaches the buffer to a named slot on a kernel or material
 * - release: unbinds the slots it still holds, frees the buffer, and is
 *   safe to repeat
 *
 * Release never fails. Releasing a buffer twice, or one that was never
 * allocated, does nothing.
 */

use bytemuck::Pod;

use crate::error::HostError;
use crate::host::{BufferDesc, BufferKind, GpuHost, HostStage};

pub struct ManagedBuffer<H: GpuHost> {
    desc: BufferDesc,
    raw: Option<H::Buffer>,
    bindings: Vec<(HostStage<H>, &'static str)>,
}

impl<H: GpuHost> ManagedBuffer<H> {
    // A handle that owns nothing yet
    pub fn unallocated(label: &'static str, kind: BufferKind) -> Self {
        Self {
            desc: BufferDesc { label, count: 0, stride: 0, kind },
            raw: None,
            bindings: Vec::new(),
        }
    }

    pub fn allocate(
        host: &mut H,
        label: &'static str,
        count: usize,
        stride: usize,
        kind: BufferKind,
    ) -> Result<Self, HostError> {
        let desc = BufferDesc { label, count, stride, kind };
        let raw = host.create_buffer(&desc)?;

        tracing::debug!(
            buffer = label,
            count,
            stride,
            bytes = desc.byte_size(),
            ?kind,
            "allocated gpu buffer"
        );

        Ok(Self {
            desc,
            raw: Some(raw),
            bindings: Vec::new(),
        })
    }

    pub fn upload<T: Pod>(&self, host: &mut H, data: &[T]) -> Result<(), HostError> {
        let raw = self.raw.as_ref().ok_or(HostError::Released(self.desc.label))?;
        let bytes: &[u8] = bytemuck::cast_slice(data);

        if bytes.len() as u64 != self.byte_size() {
            return Err(HostError::SizeMismatch {
                label: self.desc.label,
                expected: self.byte_size(),
                actual: bytes.len() as u64,
            });
        }

        host.write_buffer(raw, bytes)
    }

    pub fn bind(
        &mut self,
        host: &mut H,
        stage: HostStage<H>,
        slot: &'static str,
    ) -> Result<(), HostError> {
        let raw = self.raw.as_ref().ok_or(HostError::Released(self.desc.label))?;
        host.bind_buffer(raw, stage, slot)?;

        if !self.bindings.iter().any(|(s, n)| *s == stage && *n == slot) {
            self.bindings.push((stage, slot));
        }

        tracing::trace!(buffer = self.desc.label, ?stage, slot, "bound gpu buffer");
        Ok(())
    }

    pub fn release(&mut self, host: &mut H) {
        let bindings = std::mem::take(&mut self.bindings);

        if let Some(raw) = self.raw.take() {
            for (stage, slot) in bindings {
                host.unbind_buffer(&raw, stage, slot);
            }
            host.destroy_buffer(raw);
            tracing::debug!(buffer = self.desc.label, bytes = self.byte_size(), "released gpu buffer");
        }
    }

    pub fn raw(&self) -> Option<&H::Buffer> {
        self.raw.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.raw.is_some()
    }

    pub fn label(&self) -> &'static str {
        self.desc.label
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn byte_size(&self) -> u64 {
        self.desc.byte_size()
    }

    pub fn bindings(&self) -> &[(HostStage<H>, &'static str)] {
        &self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{record_size, AgentRecord};
    use crate::headless::{HeadlessHost, HostCall};
    use crate::host::Stage;
    use crate::PROPERTIES_SLOT;

    fn host_with_kernel() -> (HeadlessHost, <HeadlessHost as GpuHost>::Kernel) {
        let mut host = HeadlessHost::new();
        let shader = host.add_shader(&[crate::KERNEL_ENTRY_POINT]);
        let kernel = host.find_kernel(&shader, crate::KERNEL_ENTRY_POINT).unwrap();
        (host, kernel)
    }

    #[test]
    fn allocation_size_is_count_times_record_size() {
        let mut host = HeadlessHost::new();
        for count in [0usize, 1, 63, 64, 65, 1000] {
            let buffer = ManagedBuffer::allocate(
                &mut host,
                "agents",
                count,
                record_size(),
                BufferKind::Structured,
            )
            .unwrap();
            assert_eq!(buffer.byte_size(), (count * record_size()) as u64);
            assert_eq!(host.buffer_size(buffer.raw().unwrap()), Some(buffer.byte_size()));
        }
    }

    #[test]
    fn upload_must_fill_the_whole_buffer() {
        let mut host = HeadlessHost::new();
        let buffer =
            ManagedBuffer::allocate(&mut host, "agents", 4, record_size(), BufferKind::Structured)
                .unwrap();

        let short = vec![AgentRecord::default(); 3];
        assert!(matches!(
            buffer.upload(&mut host, &short),
            Err(HostError::SizeMismatch { expected: 368, actual: 276, .. })
        ));

        let full = vec![AgentRecord::default(); 4];
        buffer.upload(&mut host, &full).unwrap();
        assert_eq!(host.buffer_contents(buffer.raw().unwrap()).unwrap().len(), 368);
    }

    #[test]
    fn zero_length_buffer_allocates_and_uploads() {
        let mut host = HeadlessHost::new();
        let buffer =
            ManagedBuffer::allocate(&mut host, "agents", 0, record_size(), BufferKind::Structured)
                .unwrap();
        buffer.upload::<AgentRecord>(&mut host, &[]).unwrap();
        assert_eq!(buffer.byte_size(), 0);
    }

    #[test]
    fn release_twice_is_a_no_op() {
        let (mut host, kernel) = host_with_kernel();
        let material = host.add_material();
        let mut buffer =
            ManagedBuffer::allocate(&mut host, "agents", 8, record_size(), BufferKind::Structured)
                .unwrap();
        buffer.bind(&mut host, Stage::Compute(kernel), PROPERTIES_SLOT).unwrap();
        buffer.bind(&mut host, Stage::Render(material), PROPERTIES_SLOT).unwrap();
        assert_eq!(host.bound_slot_count(), 2);

        buffer.release(&mut host);
        buffer.release(&mut host);

        assert!(!buffer.is_allocated());
        assert_eq!(host.live_buffer_count(), 0);
        assert_eq!(host.bound_slot_count(), 0);
        let destroys = host
            .calls()
            .iter()
            .filter(|c| matches!(c, HostCall::DestroyBuffer { .. }))
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    fn releasing_a_never_allocated_buffer_is_a_no_op() {
        let mut host = HeadlessHost::new();
        let mut buffer = ManagedBuffer::<HeadlessHost>::unallocated("args", BufferKind::IndirectArguments);
        buffer.release(&mut host);
        buffer.release(&mut host);
        assert!(host.calls().is_empty());
        assert_eq!(host.bound_slot_count(), 0);
    }

    #[test]
    fn released_buffer_refuses_to_bind() {
        let (mut host, kernel) = host_with_kernel();
        let mut buffer =
            ManagedBuffer::allocate(&mut host, "agents", 2, record_size(), BufferKind::Structured)
                .unwrap();
        buffer.release(&mut host);

        assert!(matches!(
            buffer.bind(&mut host, Stage::Compute(kernel), PROPERTIES_SLOT),
            Err(HostError::Released("agents"))
        ));
    }

    #[test]
    fn releasing_leaves_a_newer_binding_in_place() {
        let mut host = HeadlessHost::new();
        let material = host.add_material();
        let stage = Stage::Render(material);
        let mut old =
            ManagedBuffer::allocate(&mut host, "old", 2, record_size(), BufferKind::Structured)
                .unwrap();
        let mut new =
            ManagedBuffer::allocate(&mut host, "new", 2, record_size(), BufferKind::Structured)
                .unwrap();

        old.bind(&mut host, stage, PROPERTIES_SLOT).unwrap();
        new.bind(&mut host, stage, PROPERTIES_SLOT).unwrap();
        let new_id = new.raw().unwrap().id();

        old.release(&mut host);
        assert_eq!(host.bound_buffer(stage, PROPERTIES_SLOT), Some(new_id));

        new.release(&mut host);
        assert_eq!(host.bound_buffer(stage, PROPERTIES_SLOT), None);
    }

    #[test]
    fn rebinding_the_same_slot_is_tracked_once() {
        let (mut host, kernel) = host_with_kernel();
        let mut buffer =
            ManagedBuffer::allocate(&mut host, "agents", 2, record_size(), BufferKind::Structured)
                .unwrap();
        buffer.bind(&mut host, Stage::Compute(kernel), PROPERTIES_SLOT).unwrap();
        buffer.bind(&mut host, Stage::Compute(kernel), PROPERTIES_SLOT).unwrap();
        assert_eq!(buffer.bindings().len(), 1);
    }
}
