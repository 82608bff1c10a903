use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mlpface::mlp::kernels::{F32AccelKernel, F32Kernel, I16AccelKernel, I16Kernel, I8Kernel, Kernel};
use mlpface::mlp::{HIDDEN_LEN, INPUT_LEN};
use mlpface::Model;

fn bench_kernel<K: Kernel>(c: &mut Criterion, model: &Model) {
    let layer = &model.hidden;
    let v = vec![K::Elem::default(); INPUT_LEN];
    let mut out = vec![K::Acc::default(); HIDDEN_LEN];
    c.bench_function(&format!("mvm_{}_{}x{}", K::NAME, HIDDEN_LEN, INPUT_LEN), |b| {
        b.iter(|| {
            K::mvm(black_box(K::weights(layer)), black_box(&v), layer.zero_points(), &mut out);
            black_box(&out);
        })
    });
}

fn bench_mvm(c: &mut Criterion) {
    let model = Model::synthetic(1).expect("synthetic model");
    bench_kernel::<F32Kernel>(c, &model);
    bench_kernel::<F32AccelKernel>(c, &model);
    bench_kernel::<I8Kernel>(c, &model);
    bench_kernel::<I16Kernel>(c, &model);
    bench_kernel::<I16AccelKernel>(c, &model);
}

criterion_group!(benches, bench_mvm);
criterion_main!(benches);
