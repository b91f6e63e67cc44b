/// Annotated example script printed by `gds -h` and written by `gds -x`
pub const SAMPLE_SCRIPT: &str = r##"# gds sample script
#
# Lines starting with "#" or ";" are comments. Quote arguments that contain
# spaces. Run with "gds -v <script>" to check a script without writing files.

# Every design matrix starts with gsession. A path ending in .G names the
# output files directly; any other path is a directory that receives
# <dir>/<basename>.G and <dir>/<basename>.preG.
gsession /tmp/gds-sample/sample.G

# Timing. TR and sampling are in ms; length is the number of time points.
# TR must be a multiple of sampling. Scan files can supply TR and length:
#   scan /data/run1.tes
#   scan fake-run 60          (name and length only, no companion files)
TR 2000
sampling 100
length 120

# A condition function enables "newcov diagonal" and "newcov contrast":
#   condition /data/cond.ref
#   condition-label-name rest tap look
#   mod-condition-label look watch
#   save-condition-label /tmp/labels.txt

# Mean-center every non-constant column when the matrices are written
mean-center-all

# Intercept: default name Intercept, type K (KeepNoInterest)
newcov intercept
end

# Trial effects of 40 s each: trialfx-1, trialfx-2, ...
# "option time-shift 3000" would shift every output by 3 s and rename it
# "trialfx-1 [shift 3000]", ...
newcov trial-effect 40
  group blocks
end

# Spikes at time points 10, 20 and 67 to 70; a section may add more with
#   absolute 80-82
#   relative <scan name or index> 2,5
newcov spike "10, 20, 67-70"
  type I
end

# Other generators:
#   newcov single /data/foo.ref        (then: option convolve /data/hrf.ref 2000 hrf)
#   newcov var-trialfx /data/trials.ref
#   newcov diagonal                    (scale y|n, center-norm y|n)
#   newcov contrast                    (matrix-row 0 1 -1)
#   newcov scan-effect                 (scan-length 60 60 without scan lines)
#   newcov global-signal
#   newcov move-params
#   newcov txt-file /data/columns.txt

# Copies are the only place for derivative and exponential
newcov cp blocks->trialfx-1
  cov-name slope1 slope2
  option derivative 2
end

# modcov changes one covariate in place; modcov+ may expand it with
# eigen-vector, fir <order> or fourier-set (fs-period, fs-harmonics,
# fs-zero-freq, fs-delta-cov)
modcov blocks->trialfx-3
  type N
  option unit-variance
end

modcov+ blocks->trialfx-2
  option fir 2
end

# Orthogonalize against other covariates:
#   modcov blocks->trialfx-4
#     option orthog
#     orth-type I                      (or: orth-name Intercept spike-10)
#   end

# Efficiency check: delete Interest covariates that keep less than 5% of the
# base covariate's efficiency. "filter <file>" names the hemodynamic filter.
chkeff blocks->trialfx-1
  downsample no
  eff-type I
  eff-cutoff 0.05
end

del-cov spike-67

# save-cov blocks->slope1 /tmp/slope1.ref
# include /data/common.gds
# openG /data/previous.G
"##;
