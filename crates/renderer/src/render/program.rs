//! Vertex programs and buffers, one of each per vertex layout.

use std::collections::hash_map::Entry;

use pica64::modules::render::Attributes;
use rustc_hash::FxHashMap;

use crate::gpu::{BufferId, Command, Gpu, ProgramId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program {
    pub id: ProgramId,
    pub buffer: BufferId,
}

#[derive(Default)]
pub struct Cache {
    programs: FxHashMap<Attributes, Program>,
}

impl Cache {
    /// Returns the program for a vertex layout, creating it on the GPU if needed. The boolean
    /// tells whether it was created.
    pub fn get(&mut self, gpu: &mut impl Gpu, attributes: Attributes) -> (Program, bool) {
        let next = self.programs.len() as u8;
        match self.programs.entry(attributes) {
            Entry::Occupied(entry) => (*entry.get(), false),
            Entry::Vacant(entry) => {
                let program = Program {
                    id: ProgramId(next),
                    buffer: BufferId(next),
                };

                tracing::debug!(?attributes, ?program, "creating vertex program");
                gpu.submit(Command::CreateProgram {
                    id: program.id,
                    attributes,
                });
                gpu.submit(Command::CreateBuffer {
                    id: program.buffer,
                    stride: attributes.stride(),
                });

                (*entry.insert(program), true)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gpu::RecordingGpu;

    #[test]
    fn one_program_per_layout() {
        let mut gpu = RecordingGpu::default();
        let mut cache = Cache::default();

        let (first, created) = cache.get(&mut gpu, Attributes::COLOR);
        assert!(created);
        assert_eq!(gpu.len(), 2);

        let (again, created) = cache.get(&mut gpu, Attributes::COLOR);
        assert!(!created);
        assert_eq!(again, first);
        assert_eq!(gpu.len(), 2);

        let (other, _) = cache.get(&mut gpu, Attributes::all());
        assert_ne!(other.id, first.id);
        assert_eq!(
            gpu.take()[3],
            Command::CreateBuffer {
                id: other.buffer,
                stride: 10
            }
        );
    }
}
